//! egui 界面实现

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use eframe::egui;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::session::InputEvent;

/// 消息历史上限
const MAX_LINES: usize = 1000;

/// 聊天记录中的一行
#[derive(Debug, Clone)]
struct LogLine {
    received_at: DateTime<Local>,
    text: String,
}

/// 聊天记录
///
/// 服务端的一块内容可能包含多行，也可能只是一行的一部分；
/// 不完整的行先缓存，等换行到达后再显示。
#[derive(Debug, Default)]
pub struct ChatLog {
    lines: VecDeque<LogLine>,
    partial: String,
}

impl ChatLog {
    pub fn push_chunk(&mut self, chunk: &str) {
        self.partial.push_str(chunk);
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            self.push_line(line.trim_end_matches(['\n', '\r']));
        }
    }

    /// 连接结束时把缓存的半行也显示出来
    pub fn flush(&mut self) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.push_line(&line);
        }
    }

    fn push_line(&mut self, text: &str) {
        if self.lines.len() >= MAX_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(LogLine {
            received_at: Local::now(),
            text: text.to_string(),
        });
    }

    #[cfg(test)]
    fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.text.as_str())
    }
}

/// 聊天室应用
pub struct ChatApp {
    room_name: String,
    log: ChatLog,
    input_text: String,
    /// 会话关闭输入通道后置为 `None`，输入框随之禁用
    input_tx: Option<mpsc::UnboundedSender<InputEvent>>,
    output_rx: mpsc::UnboundedReceiver<String>,
    output_open: bool,
    auto_scroll: bool,
}

impl ChatApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        room_name: String,
        input_tx: mpsc::UnboundedSender<InputEvent>,
        output_rx: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        setup_fonts(&cc.egui_ctx);
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        Self {
            room_name,
            log: ChatLog::default(),
            input_text: String::new(),
            input_tx: Some(input_tx),
            output_rx,
            output_open: true,
            auto_scroll: true,
        }
    }

    /// 取出网络线程送来的内容，返回是否有新内容
    fn poll_output(&mut self) -> bool {
        let mut has_output = false;
        while self.output_open {
            match self.output_rx.try_recv() {
                Ok(chunk) => {
                    self.log.push_chunk(&chunk);
                    has_output = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.log.flush();
                    self.output_open = false;
                    has_output = true;
                }
            }
        }

        if self.input_tx.as_ref().is_some_and(|tx| tx.is_closed()) {
            self.input_tx = None;
        }
        has_output
    }

    fn send_input(&mut self) {
        if self.input_text.is_empty() {
            return;
        }
        let Some(tx) = &self.input_tx else {
            return;
        };

        let line = std::mem::take(&mut self.input_text);
        if tx.send(InputEvent::Line(line)).is_err() {
            self.input_tx = None;
        }
    }
}

/// 配置中文字体
fn setup_fonts(ctx: &egui::Context) {
    const FONT_PATHS: [&str; 4] = [
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/STHeiti Light.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    ];

    let Some(font_data) = FONT_PATHS.iter().find_map(|path| std::fs::read(path).ok()) else {
        tracing::warn!("no CJK font found, falling back to egui defaults");
        return;
    };

    let mut fonts = egui::FontDefinitions::default();
    fonts
        .font_data
        .insert("cjk".to_owned(), egui::FontData::from_owned(font_data).into());
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        fonts
            .families
            .entry(family)
            .or_default()
            .insert(0, "cjk".to_owned());
    }
    ctx.set_fonts(fonts);
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.poll_output() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }

        egui::TopBottomPanel::top("top_panel")
            .frame(egui::Frame::new().fill(egui::Color32::from_rgb(30, 30, 40)).inner_margin(8.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading(egui::RichText::new(&self.room_name).color(egui::Color32::WHITE));
                    ui.separator();
                    if self.input_tx.is_some() {
                        ui.label(egui::RichText::new("● 已连接").color(egui::Color32::GREEN));
                    } else {
                        ui.label(egui::RichText::new("● 已断开").color(egui::Color32::GRAY));
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.checkbox(&mut self.auto_scroll, "自动滚动");
                    });
                });
            });

        egui::TopBottomPanel::bottom("bottom_panel")
            .frame(egui::Frame::new().fill(egui::Color32::from_rgb(35, 35, 45)).inner_margin(8.0))
            .show(ctx, |ui| {
                let enabled = self.input_tx.is_some();
                ui.add_enabled_ui(enabled, |ui| {
                    ui.horizontal(|ui| {
                        let hint = if enabled { "Enter text here..." } else { "" };
                        let response = ui.add(
                            egui::TextEdit::singleline(&mut self.input_text)
                                .hint_text(hint)
                                .desired_width(ui.available_width() - 80.0),
                        );

                        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            self.send_input();
                            response.request_focus();
                        }

                        if ui.add(egui::Button::new("发送").min_size(egui::vec2(60.0, 24.0))).clicked() {
                            self.send_input();
                        }
                    });
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(egui::Color32::from_rgb(20, 20, 28)).inner_margin(8.0))
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .stick_to_bottom(self.auto_scroll)
                    .show(ui, |ui| {
                        for line in &self.log.lines {
                            show_line(ui, line);
                        }
                    });
            });
    }
}

fn show_line(ui: &mut egui::Ui, line: &LogLine) {
    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new(format!("[{}]", line.received_at.format("%H:%M:%S")))
                .size(11.0)
                .color(egui::Color32::from_rgb(100, 100, 110)),
        );

        // "<发送者>: <内容>" 给发送者着色，其余按系统消息显示
        match line.text.split_once(": ") {
            Some((sender, text)) if !sender.contains(' ') => {
                ui.label(
                    egui::RichText::new(format!("{sender}:"))
                        .strong()
                        .color(sender_color(sender)),
                );
                ui.label(egui::RichText::new(text).color(egui::Color32::from_rgb(220, 220, 230)));
            }
            _ => {
                ui.label(
                    egui::RichText::new(&line.text)
                        .italics()
                        .color(egui::Color32::from_rgb(150, 150, 160)),
                );
            }
        }
    });
}

/// 根据发送者名称生成稳定的颜色
fn sender_color(sender: &str) -> egui::Color32 {
    let hash = sender
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    let hue = (hash % 360) as f32 / 360.0;
    egui::ecolor::Hsva::new(hue, 0.6, 0.9, 1.0).into()
}
