use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RunnerError;

#[derive(Debug)]
pub struct LineTap {
    pub line: String,
    pub stream: LineStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStream {
    Stdout,
    Stderr,
}

impl LineStream {
    pub fn as_str(self) -> &'static str {
        match self {
            LineStream::Stdout => "stdout",
            LineStream::Stderr => "stderr",
        }
    }
}

/// Reads `rd` to EOF and sends every line to `line_tx`. Returns the byte count.
pub fn pump_lines<R>(
    rd: R,
    stream: LineStream,
    line_tx: mpsc::Sender<LineTap>,
) -> JoinHandle<Result<u64, RunnerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(pump(rd, stream, line_tx))
}

async fn pump<R>(
    mut rd: R,
    stream: LineStream,
    line_tx: mpsc::Sender<LineTap>,
) -> Result<u64, RunnerError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 16 * 1024];
    let mut total = 0u64;
    let mut line_buf: Vec<u8> = Vec::with_capacity(8 * 1024);

    loop {
        let n = rd.read(&mut buf).await.map_err(|e| RunnerError::StreamIo {
            stream: stream.as_str(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        total += n as u64;

        line_buf.extend_from_slice(&buf[..n]);
        while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
            let mut one = line_buf.drain(..=pos).collect::<Vec<u8>>();
            trim_newline(&mut one);
            let line = String::from_utf8_lossy(&one).to_string();
            if line_tx.send(LineTap { line, stream }).await.is_err() {
                // Receiver gone; nobody is listening any more.
                return Ok(total);
            }
        }
    }

    // EOF flush: deliver the last partial line if it doesn't end with '\n'.
    trim_newline(&mut line_buf);
    if !line_buf.is_empty() {
        let line = String::from_utf8_lossy(&line_buf).to_string();
        let _ = line_tx.send(LineTap { line, stream }).await;
    }

    Ok(total)
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
