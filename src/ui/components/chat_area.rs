use eframe::egui;

use crate::common::{Message, Origin, SessionState};
use crate::content::{Inline, Segment, segment};

pub fn render(ui: &mut egui::Ui, session: &SessionState) {
    if session.loading.is_some() {
        ui.centered_and_justified(|ui| ui.spinner());
        return;
    }

    if session.log.is_empty() {
        ui.centered_and_justified(|ui| {
            ui.label(egui::RichText::new("Ask a Rust question to get started").weak());
        });
        return;
    }

    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .auto_shrink([false; 2])
        .show(ui, |ui| {
            for message in &session.log {
                render_message(ui, message);
                ui.add_space(6.0);
            }
            if session.pending {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(egui::RichText::new("Thinking...").italics().weak());
                });
            }
        });
}

fn render_message(ui: &mut egui::Ui, message: &Message) {
    let (layout, fill) = match message.origin {
        Origin::Local => (
            egui::Layout::right_to_left(egui::Align::TOP),
            egui::Color32::from_rgb(37, 99, 235),
        ),
        Origin::Remote => (
            egui::Layout::left_to_right(egui::Align::TOP),
            egui::Color32::from_gray(32),
        ),
    };

    ui.with_layout(layout, |ui| {
        egui::Frame::group(ui.style()).fill(fill).show(ui, |ui| {
            ui.set_max_width(ui.available_width() * 0.8);
            ui.vertical(|ui| {
                for part in segment(&message.content) {
                    match part {
                        Segment::Text(inlines) => render_prose(ui, &inlines),
                        Segment::Code { language, code } => render_code(ui, &language, &code),
                    }
                }
                ui.label(
                    egui::RichText::new(message.created_at.format("%H:%M").to_string())
                        .small()
                        .weak(),
                );
            });
        });
    });
}

fn render_prose(ui: &mut egui::Ui, inlines: &[Inline]) {
    ui.horizontal_wrapped(|ui| {
        ui.spacing_mut().item_spacing.x = 0.0;
        for inline in inlines {
            match inline {
                Inline::Text(text) => {
                    ui.label(egui::RichText::new(text).color(egui::Color32::WHITE));
                }
                Inline::Code(code) => {
                    ui.label(egui::RichText::new(code).code());
                }
            }
        }
    });
}

fn render_code(ui: &mut egui::Ui, language: &str, code: &str) {
    egui::Frame::group(ui.style())
        .fill(egui::Color32::from_gray(18))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(language).monospace().small());
                if ui.small_button("Copy").clicked() {
                    ui.ctx().copy_text(code.to_string());
                }
            });
            ui.label(egui::RichText::new(code).monospace());
        });
}
