use serialmux_frame::{RegisterRequest, RegisterType};
use serialmux_link::{Client, ClientConfig};

use crate::cmd::{block_on, open_link, parse_duration, LinkArgs, RegReadArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{log_stats, print_reply, OutputFormat};

pub fn run(args: RegReadArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = build_request(&args)?;

    let reply = block_on(async {
        let manager = open_link(link).await?;
        let config = ClientConfig {
            timeout,
            ..ClientConfig::default()
        };
        let client = Client::with_config(manager, args.target, config)
            .map_err(|err| link_error("invalid target", err))?;
        let reply = client
            .register_query(&request)
            .await
            .map_err(|err| link_error("register query failed", err))?;
        log_stats(&client.manager().stats());
        Ok(reply)
    })?;

    if reply.is_empty() {
        return Err(CliError::new(
            TIMEOUT,
            format!("no reply from device {} within {timeout:?}", args.target),
        ));
    }
    print_reply(args.target, &reply, format);
    Ok(SUCCESS)
}

fn build_request(args: &RegReadArgs) -> CliResult<RegisterRequest> {
    let ty = RegisterType::from(args.register_type);
    let mut request = RegisterRequest::new();
    match args.count {
        0 => return Err(CliError::new(USAGE, "--count must be at least 1")),
        1 => request.read_single(args.register, ty),
        count => request.read_multiple(args.register, count, ty),
    };
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::TypeArg;

    fn args(count: u32) -> RegReadArgs {
        RegReadArgs {
            target: 1,
            register: 0x10,
            count,
            register_type: TypeArg::Int16,
            timeout: "50ms".to_string(),
        }
    }

    #[test]
    fn single_read() {
        let request = build_request(&args(1)).unwrap();
        assert_eq!(request.as_bytes(), &[0x19, 0x10]);
        assert!(request.expects_response());
    }

    #[test]
    fn multiple_read() {
        let request = build_request(&args(4)).unwrap();
        assert_eq!(request.as_bytes(), &[0x1d, 0x10, 0x04]);
    }

    #[test]
    fn zero_count_is_usage_error() {
        assert_eq!(build_request(&args(0)).unwrap_err().code, USAGE);
    }
}
