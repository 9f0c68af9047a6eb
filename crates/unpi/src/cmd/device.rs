use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::exit::{io_error, CliResult};

pub type DeviceReader = Box<dyn AsyncRead + Send + Unpin>;
pub type DeviceWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Open the link to the coprocessor.
///
/// Unix sockets are connected directly. Anything else is treated as an
/// already configured character device (baud rate, flow control) and opened
/// twice, once per direction, so reads never hold up writes.
pub async fn open(path: &Path) -> CliResult<(DeviceReader, DeviceWriter)> {
    let context = format!("failed opening {}", path.display());

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        let metadata = std::fs::metadata(path).map_err(|err| io_error(&context, err))?;
        if metadata.file_type().is_socket() {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(|err| io_error(&context, err))?;
            debug!(path = %path.display(), "connected to unix socket");
            let (reader, writer) = stream.into_split();
            return Ok((Box::new(reader), Box::new(writer)));
        }
    }

    let reader = tokio::fs::OpenOptions::new()
        .read(true)
        .open(path)
        .await
        .map_err(|err| io_error(&context, err))?;
    let writer = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|err| io_error(&context, err))?;
    debug!(path = %path.display(), "opened device");
    Ok((Box::new(reader), Box::new(writer)))
}
