use framepipe_frame::{DEFAULT_BUFFER_CAPACITY, HEADER_LEN};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framepipe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framepipe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("FRAMEPIPE_BUILD_TARGET").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("frame_header_len: {HEADER_LEN}");
    println!("default_buffer_capacity: {DEFAULT_BUFFER_CAPACITY}");

    Ok(SUCCESS)
}
