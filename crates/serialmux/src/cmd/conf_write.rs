use std::fs;

use serialmux_link::{Client, ClientConfig};

use crate::cmd::{block_on, open_link, parse_duration, ConfWriteArgs, LinkArgs};
use crate::exit::{io_error, link_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{
    log_stats, print_conf_progress, print_conf_summary, text, ConfLine, OutputFormat,
};

const EXPECTED_REPLY: &[u8] = b"OK";

pub fn run(args: ConfWriteArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let reply_timeout = parse_duration(&args.timeout)?;
    let line_timeout = parse_duration(&args.line_timeout)?;
    let data = fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;
    let commands = command_lines(&data);

    let applied = block_on(async {
        let manager = open_link(link).await?;
        let config = ClientConfig {
            channel: args.channel,
            timeout: reply_timeout,
            ..ClientConfig::default()
        };
        let mut client = Client::with_config(manager, args.target, config)
            .map_err(|err| link_error("invalid target", err))?;

        let mut applied = Vec::with_capacity(commands.len());
        for command in &commands {
            let shown = text(command.trim_ascii());
            client.write(command);
            client
                .drain()
                .await
                .map_err(|err| link_error(&format!("sending {shown:?} failed"), err))?;
            let reply = client
                .read_line_within(line_timeout)
                .await
                .map_err(|err| link_error(&format!("no reply to {shown:?}"), err))?;

            let line = ConfLine {
                command: shown,
                reply: text(reply.trim_ascii()),
            };
            print_conf_progress(&line, format);
            if reply.trim_ascii() != EXPECTED_REPLY {
                return Err(CliError::new(
                    DATA_INVALID,
                    format!("unexpected reply to {:?}: {:?}", line.command, line.reply),
                ));
            }
            applied.push(line);
        }
        log_stats(&client.manager().stats());
        Ok(applied)
    })?;

    print_conf_summary(args.target, args.channel, &applied, format);
    Ok(SUCCESS)
}

/// Non-blank lines of `data`, each ending in a newline.
fn command_lines(data: &[u8]) -> Vec<Vec<u8>> {
    data.split_inclusive(|&b| b == b'\n')
        .filter(|line| !line.trim_ascii().is_empty())
        .map(|line| {
            let mut line = line.to_vec();
            if line.last() != Some(&b'\n') {
                line.push(b'\n');
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        let lines = command_lines(b"conf set a 1\n\n   \nconf set b 2\r\n");
        assert_eq!(
            lines,
            vec![b"conf set a 1\n".to_vec(), b"conf set b 2\r\n".to_vec()]
        );
    }

    #[test]
    fn last_line_gets_terminator() {
        let lines = command_lines(b"conf write");
        assert_eq!(lines, vec![b"conf write\n".to_vec()]);
    }

    #[test]
    fn empty_file_has_no_commands() {
        assert!(command_lines(b"").is_empty());
        assert!(command_lines(b"\n\r\n").is_empty());
    }
}
