use tracing::{info, warn};
use unpi_broker::{Broker, BrokerConfig, BrokerError};

use crate::cmd::{ctrl_c_token, device, ListenArgs};
use crate::exit::{broker_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let (reader, writer) = device::open(&args.device).await?;
    let broker = Broker::with_config(
        reader,
        writer,
        BrokerConfig {
            passthrough: args.all,
            ..BrokerConfig::default()
        },
    );
    let cancel = ctrl_c_token();

    let mut printed = 0usize;
    let result = loop {
        if args.count.is_some_and(|count| printed >= count) {
            break Ok(());
        }

        let next = if args.all {
            tokio::select! {
                next = broker.receive() => next,
                _ = cancel.cancelled() => Err(BrokerError::Cancelled),
            }
        } else {
            broker.read_event(&cancel).await
        };

        match next {
            Ok(frame) => {
                print_frame(&frame, format);
                printed = printed.saturating_add(1);
            }
            Err(BrokerError::DecodeFailed(err)) => warn!(error = %err, "skipping malformed frame"),
            Err(BrokerError::Cancelled) => break Ok(()),
            Err(BrokerError::Terminated) => {
                info!(printed, "device closed");
                break Ok(());
            }
            Err(err) => break Err(err),
        }
    };
    broker.shutdown().await;

    result.map_err(|err| broker_error("listen failed", err))?;
    Ok(SUCCESS)
}
