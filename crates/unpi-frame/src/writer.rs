use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::{encode_frame, Frame, HEADER_SIZE, MAX_PAYLOAD, TRAILER_SIZE};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `AsyncWrite` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: AsyncWrite + Unpin> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD + TRAILER_SIZE),
        }
    }

    /// Encode a frame and write all of its bytes, then flush.
    ///
    /// Encoding happens before anything touches the stream, so an invalid
    /// frame never produces a partial write.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush().await
    }

    /// Flush the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush().await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(FrameError::Io)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use bytes::Bytes;

    use super::*;
    use crate::codec::decode_frame;
    use crate::kind::MessageKind;
    use crate::subsystem::Subsystem;

    #[tokio::test]
    async fn write_frames_back_to_back() {
        let mut writer = FrameWriter::new(Vec::<u8>::new());
        let one = Frame::new(MessageKind::SyncRequest, Subsystem::SYS, 2, Bytes::new());
        let two = Frame::new(MessageKind::AsyncRequest, Subsystem::ZDO, 1, vec![0x78]);

        writer.write_frame(&one).await.unwrap();
        writer.write_frame(&two).await.unwrap();

        let mut wire = BytesMut::from(writer.into_inner().as_slice());
        assert_eq!(decode_frame(&mut wire).unwrap().unwrap(), one);
        assert_eq!(decode_frame(&mut wire).unwrap().unwrap(), two);
        assert!(wire.is_empty());
    }

    #[tokio::test]
    async fn oversized_payload_writes_nothing() {
        let mut writer = FrameWriter::new(Vec::<u8>::new());
        let frame = Frame::new(MessageKind::AsyncRequest, Subsystem::AF, 1, vec![0; 300]);

        let err = writer.write_frame(&frame).await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(writer.into_inner().is_empty());
    }

    #[tokio::test]
    async fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        let frame = Frame::new(MessageKind::Poll, Subsystem::SYS, 0, Bytes::new());
        writer.write_frame(&frame).await.unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let frame = Frame::new(MessageKind::Poll, Subsystem::SYS, 0, Bytes::new());

        let err = writer.write_frame(&frame).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl AsyncWrite for FlushTrackingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            self.flushed.store(true, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct ZeroWriter;

    impl AsyncWrite for ZeroWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(0))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
