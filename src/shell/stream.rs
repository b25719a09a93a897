//! Output relay for child processes

use std::process::ExitStatus;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;

/// Forward the child's stdout/stderr to ours while waiting for it to exit.
///
/// Each stream gets its own task so a slow reader on one side never stalls
/// the other or the wait. Order within a stream is kept; order across the
/// two is not.
pub async fn wait_streaming(mut child: Child) -> std::io::Result<ExitStatus> {
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward(out, tokio::io::stdout())));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward(err, tokio::io::stderr())));

    let status = child.wait().await?;

    for task in [stdout, stderr].into_iter().flatten() {
        match task.await {
            Ok(Ok(bytes)) => tracing::trace!("Relayed {} bytes", bytes),
            Ok(Err(e)) => tracing::warn!("Error relaying child output: {}", e),
            Err(e) => tracing::warn!("Output relay task failed: {}", e),
        }
    }

    Ok(status)
}

async fn forward<R, W>(mut reader: R, mut writer: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.flush().await?;
    Ok(bytes)
}

/// Exit code of a finished child, passed through untouched.
///
/// Signal deaths report `128 + signal`, as a shell would.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
