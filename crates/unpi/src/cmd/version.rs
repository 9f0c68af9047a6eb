use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("unpi {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "target: {}",
        option_env!("UNPI_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("max_payload: {} bytes", unpi_frame::MAX_PAYLOAD);
    println!(
        "defaults: timeout={:?} retries={}",
        unpi_broker::DEFAULT_TIMEOUT,
        unpi_broker::DEFAULT_RETRIES
    );

    Ok(SUCCESS)
}
