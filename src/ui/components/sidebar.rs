use chrono::Utc;
use eframe::egui;

use crate::common::ChatId;
use crate::ui::state::{AppState, relative_time};

pub enum SidebarAction {
    NewChat,
    Refresh,
    Select(ChatId),
    Delete(ChatId),
}

pub fn render(ui: &mut egui::Ui, state: &AppState) -> Option<SidebarAction> {
    let mut action = None;
    // switching away from an unanswered message is refused by the session anyway
    let idle = !state.session.pending;

    ui.horizontal(|ui| {
        if ui.add_enabled(idle, egui::Button::new("+ New chat")).clicked() {
            action = Some(SidebarAction::NewChat);
        }
        if ui.small_button("⟳").clicked() {
            action = Some(SidebarAction::Refresh);
        }
    });
    ui.separator();

    if state.conversations.is_empty() {
        ui.label(egui::RichText::new("No conversations yet").weak());
        return action;
    }

    let now = Utc::now();
    egui::ScrollArea::vertical().show(ui, |ui| {
        for chat in &state.conversations {
            let active = state.session.conversation.as_ref() == Some(&chat.id)
                || state.session.loading.as_ref() == Some(&chat.id);
            ui.horizontal(|ui| {
                let label = ui.add_enabled(
                    idle,
                    egui::Button::selectable(active, chat.display_title()),
                );
                if label.clicked() && !active {
                    action = Some(SidebarAction::Select(chat.id.clone()));
                }
                if ui.small_button("🗑").on_hover_text("Delete").clicked() {
                    action = Some(SidebarAction::Delete(chat.id.clone()));
                }
            });
            ui.label(egui::RichText::new(relative_time(chat.updated_at, now)).weak().small());
        }
    });
    action
}
