use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use serialmux_frame::{CrcMode, Register, RegisterType, BROADCAST_ID};
use serialmux_link::{LinkConfig, LinkManager};
use serialmux_transport::{Endpoint, SocketStream, StreamTransport};

use crate::exit::{io_error, link_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod conf_write;
pub mod reg_read;
pub mod reg_write;
pub mod version;

pub type SerialLink = LinkManager<StreamTransport<SocketStream>>;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a file of configuration commands over a stream channel.
    ConfWrite(ConfWriteArgs),
    /// Read registers from a device.
    RegRead(RegReadArgs),
    /// Write registers on a device.
    RegWrite(RegWriteArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::ConfWrite(args) => conf_write::run(args, link, format),
        Command::RegRead(args) => reg_read::run(args, link, format),
        Command::RegWrite(args) => reg_write::run(args, link, format),
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the shared link. Global across subcommands.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial bridge endpoint (tcp://host:port or unix:/path).
    #[arg(long, value_name = "ENDPOINT", env = "SERIALMUX_CONNECT", global = true)]
    pub connect: Option<String>,
    /// Source address of this host.
    #[arg(long, default_value = "0", value_parser = parse_address, global = true)]
    pub source: u8,
    /// Reject frames whose CRC does not match instead of logging them.
    #[arg(long, global = true)]
    pub strict_crc: bool,
}

#[derive(Args, Debug)]
pub struct ConfWriteArgs {
    /// File containing configuration commands, one per line.
    pub file: PathBuf,
    /// Destination device address.
    #[arg(long, short = 't', default_value = "1", value_parser = parse_address)]
    pub target: u8,
    /// Stream channel on the device.
    #[arg(long, short = 'c', default_value = "1")]
    pub channel: u32,
    /// Reply wait per poll (e.g. 300ms). Configuration writes can be slow.
    #[arg(long, default_value = "300ms")]
    pub timeout: String,
    /// Give up on a command after this long without a reply line.
    #[arg(long, default_value = "5s")]
    pub line_timeout: String,
}

#[derive(Args, Debug)]
pub struct RegReadArgs {
    /// Destination device address.
    #[arg(long, short = 't', default_value = "1", value_parser = parse_address)]
    pub target: u8,
    /// First register (decimal or 0x-prefixed hex).
    #[arg(long, short = 'r', value_parser = parse_register)]
    pub register: Register,
    /// Number of consecutive registers.
    #[arg(long, default_value = "1")]
    pub count: u32,
    /// Register value type.
    #[arg(long = "type", value_enum)]
    pub register_type: TypeArg,
    /// Reply wait (e.g. 50ms, 1s).
    #[arg(long, default_value = "50ms")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct RegWriteArgs {
    /// Destination device address.
    #[arg(long, short = 't', default_value = "1", value_parser = parse_address)]
    pub target: u8,
    /// First register (decimal or 0x-prefixed hex).
    #[arg(long, short = 'r', value_parser = parse_register)]
    pub register: Register,
    /// Register value type.
    #[arg(long = "type", value_enum)]
    pub register_type: TypeArg,
    /// Values for consecutive registers.
    #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
    pub values: Vec<String>,
    /// Ask the device to answer and print its reply.
    #[arg(long)]
    pub ack: bool,
    /// Reply wait when --ack is set.
    #[arg(long, default_value = "50ms")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    Int8,
    Int16,
    Int32,
    Float,
}

impl From<TypeArg> for RegisterType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Int8 => RegisterType::Int8,
            TypeArg::Int16 => RegisterType::Int16,
            TypeArg::Int32 => RegisterType::Int32,
            TypeArg::Float => RegisterType::Float,
        }
    }
}

fn parse_address(input: &str) -> Result<u8, String> {
    let value: u8 = input
        .parse()
        .map_err(|_| format!("invalid address: {input}"))?;
    if value > BROADCAST_ID {
        return Err(format!("address {value} does not fit in 7 bits"));
    }
    Ok(value)
}

fn parse_register(input: &str) -> Result<Register, String> {
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => Register::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid register: {input}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Run `fut` to completion on a single-threaded runtime.
pub fn block_on<T>(fut: impl Future<Output = CliResult<T>>) -> CliResult<T> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    runtime.block_on(fut)
}

/// Connect to the bridge named by `--connect` and wrap it in a link manager.
pub async fn open_link(args: &LinkArgs) -> CliResult<Arc<SerialLink>> {
    let Some(connect) = args.connect.as_deref() else {
        return Err(CliError::new(
            USAGE,
            "--connect (or SERIALMUX_CONNECT) is required",
        ));
    };
    let endpoint =
        Endpoint::parse(connect).map_err(|err| transport_error("invalid --connect", err))?;
    let transport = endpoint
        .connect()
        .await
        .map_err(|err| transport_error("connect failed", err))?;
    tracing::debug!(%endpoint, source = args.source, "link open");

    let config = LinkConfig {
        source_id: args.source,
        crc_mode: if args.strict_crc {
            CrcMode::Enforce
        } else {
            CrcMode::Ignore
        },
        ..LinkConfig::default()
    };
    let manager = LinkManager::with_config(transport, config)
        .map_err(|err| link_error("invalid link configuration", err))?;
    Ok(Arc::new(manager))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn registers_accept_hex() {
        assert_eq!(parse_register("0x10"), Ok(16));
        assert_eq!(parse_register("32"), Ok(32));
        assert!(parse_register("0xzz").is_err());
    }

    #[test]
    fn addresses_are_seven_bit() {
        assert_eq!(parse_address("127"), Ok(127));
        assert!(parse_address("128").is_err());
        assert!(parse_address("-1").is_err());
    }

    #[test]
    fn open_link_requires_endpoint() {
        let args = LinkArgs {
            connect: None,
            source: 0,
            strict_crc: false,
        };
        let err = block_on(async { open_link(&args).await.map(|_| ()) }).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn open_link_rejects_bad_endpoint() {
        let args = LinkArgs {
            connect: Some("serial:/dev/ttyUSB0".to_string()),
            source: 0,
            strict_crc: false,
        };
        let err = block_on(async { open_link(&args).await.map(|_| ()) }).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
