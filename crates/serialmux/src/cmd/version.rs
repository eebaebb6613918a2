use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("serialmux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: serialmux");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SERIALMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("SERIALMUX_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("frame_magic: 0x{:04x}", serialmux_frame::FRAME_MAGIC);
    println!("max_payload: {}", serialmux_frame::MAX_PAYLOAD);
    println!(
        "transports: tcp{}",
        if cfg!(unix) { ", unix" } else { "" }
    );

    Ok(SUCCESS)
}
