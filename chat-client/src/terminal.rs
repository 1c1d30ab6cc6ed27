//! 终端界面
//!
//! 标准输入的每一行是一条消息，服务端发来的内容原样写到标准输出。

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::session::{InputEvent, Joined};

/// 在终端上运行会话
pub async fn run(joined: Joined) -> anyhow::Result<()> {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::unbounded_channel();

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("=== {} ===\n", joined.room_name()).as_bytes())
        .await?;
    let printer = tokio::spawn(print_chunks(output_rx, stdout));

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.is_empty() => continue,
                Ok(Some(line)) => {
                    // 会话已关闭输入通道
                    if input_tx.send(InputEvent::Line(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = input_tx.send(InputEvent::Quit);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read stdin");
                    let _ = input_tx.send(InputEvent::Quit);
                    break;
                }
            }
        }
    });

    joined.run(input_rx, output_tx).await;
    printer.await??;
    Ok(())
}

async fn print_chunks<W>(
    mut output: mpsc::UnboundedReceiver<String>,
    mut out: W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = output.recv().await {
        out.write_all(chunk.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}
