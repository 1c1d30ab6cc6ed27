//! 聊天室客户端
//!
//! 默认使用 egui 图形界面，`--terminal` 时在终端中收发消息

mod cli;
mod session;
mod terminal;
mod ui;

use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use eframe::egui;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::session::ChatSession;
use crate::ui::ChatApp;

fn main() -> Result<()> {
    // 初始化日志，输出到 stderr，stdout 留给聊天内容
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chat_client=debug".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let use_terminal = cli.terminal;
    let config = cli.into_config()?;

    let rt = Runtime::new().context("failed to create tokio runtime")?;
    let joined = rt.block_on(async {
        ChatSession::connect(&config)
            .await?
            .join(&config.username)
            .await
    })?;

    if use_terminal {
        let result = rt.block_on(terminal::run(joined));
        // 标准输入的阻塞读取无法取消，不等它结束
        rt.shutdown_background();
        return result;
    }

    let room_name = joined.room_name().to_string();
    let title = room_name.clone();
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::unbounded_channel();

    // 网络线程：界面线程是同步的，会话在独立的运行时中执行
    let network = thread::spawn(move || {
        rt.block_on(joined.run(input_rx, output_tx));
        info!("session finished");
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title.as_str())
            .with_inner_size([640.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Ok(Box::new(ChatApp::new(cc, room_name, input_tx, output_rx)))),
    )
    .map_err(|e| anyhow!("failed to run GUI: {e}"))?;

    // 界面关闭时输入通道随之释放，会话结束
    network
        .join()
        .map_err(|_| anyhow!("network thread panicked"))?;
    Ok(())
}
