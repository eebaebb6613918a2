use serialmux_frame::{RegisterRequest, RegisterType, RegisterValue};
use serialmux_link::{Client, ClientConfig};

use crate::cmd::{block_on, open_link, parse_duration, LinkArgs, RegWriteArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{log_stats, print_reply, OutputFormat};

pub fn run(args: RegWriteArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let ty = RegisterType::from(args.register_type);
    let values = parse_values(ty, &args.values)?;

    let mut request = RegisterRequest::new();
    if let [value] = values.as_slice() {
        request.write_single(args.register, *value);
    } else {
        request
            .write_multiple(args.register, &values)
            .map_err(|err| CliError::new(USAGE, err.to_string()))?;
    }
    request.expect_response(args.ack);

    let reply = block_on(async {
        let manager = open_link(link).await?;
        let config = ClientConfig {
            timeout,
            ..ClientConfig::default()
        };
        let client = Client::with_config(manager, args.target, config)
            .map_err(|err| link_error("invalid target", err))?;
        let reply = client
            .register_request(&request)
            .await
            .map_err(|err| link_error("register write failed", err))?;
        log_stats(&client.manager().stats());
        Ok(reply)
    })?;

    match reply {
        Some(reply) if reply.is_empty() => Err(CliError::new(
            TIMEOUT,
            format!("no acknowledgement from device {}", args.target),
        )),
        Some(reply) => {
            print_reply(args.target, &reply, format);
            Ok(SUCCESS)
        }
        None => Ok(SUCCESS),
    }
}

fn parse_values(ty: RegisterType, inputs: &[String]) -> CliResult<Vec<RegisterValue>> {
    inputs
        .iter()
        .map(|input| {
            parse_value(ty, input.trim()).ok_or_else(|| {
                CliError::new(USAGE, format!("{input:?} is not a valid {} value", ty.name()))
            })
        })
        .collect()
}

fn parse_value(ty: RegisterType, input: &str) -> Option<RegisterValue> {
    Some(match ty {
        RegisterType::Int8 => RegisterValue::Int8(input.parse().ok()?),
        RegisterType::Int16 => RegisterValue::Int16(input.parse().ok()?),
        RegisterType::Int32 => RegisterValue::Int32(input.parse().ok()?),
        RegisterType::Float => RegisterValue::Float(input.parse().ok()?),
    })
}
