use std::path::PathBuf;

use eframe::egui;

use crate::common::ConnectionStatus;
use crate::ui::state::AppState;

pub enum NavAction {
    Reconnect,
    Logout,
    UpdateProfile { name: String, image: Option<PathBuf> },
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> Option<NavAction> {
    let mut action = None;
    ui.horizontal(|ui| {
        ui.heading(state.active_title());

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("Sign out").clicked() {
                action = Some(NavAction::Logout);
            }
            let display_name = state.user.as_ref().map(|user| user.display_name().to_string());
            if let Some(display_name) = display_name {
                ui.menu_button(display_name, |ui| {
                    if let Some(update) = profile_form(ui, state) {
                        action = Some(update);
                        ui.close();
                    }
                });
            }

            let status = state.session.connection;
            let color = match status {
                ConnectionStatus::Connected => egui::Color32::GREEN,
                ConnectionStatus::Connecting => egui::Color32::YELLOW,
                ConnectionStatus::Disconnected => egui::Color32::RED,
            };
            if status == ConnectionStatus::Disconnected && ui.small_button("Reconnect").clicked()
            {
                action = Some(NavAction::Reconnect);
            }
            ui.colored_label(color, format!("● {status}"));
        });
    });
    action
}

fn profile_form(ui: &mut egui::Ui, state: &mut AppState) -> Option<NavAction> {
    ui.label("Display name");
    ui.text_edit_singleline(&mut state.profile_name);
    ui.label("Avatar file (optional)");
    ui.add(egui::TextEdit::singleline(&mut state.profile_image).hint_text("/path/to/avatar.png"));

    let ready = !state.profile_name.trim().is_empty();
    if !ui.add_enabled(ready, egui::Button::new("Save profile")).clicked() {
        return None;
    }
    let image = state.profile_image.trim();
    Some(NavAction::UpdateProfile {
        name: state.profile_name.trim().to_string(),
        image: (!image.is_empty()).then(|| PathBuf::from(image)),
    })
}
