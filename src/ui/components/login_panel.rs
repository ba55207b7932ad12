use eframe::egui;

use crate::ui::state::AppState;

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> Option<(String, String)> {
    let mut submit = false;

    ui.vertical_centered(|ui| {
        ui.add_space(80.0);
        ui.heading("Rust Assistant");
        ui.add_space(16.0);

        if state.signing_in {
            ui.spinner();
            return;
        }

        ui.add(egui::TextEdit::singleline(&mut state.login_username).hint_text("Username"));
        let password = ui.add(
            egui::TextEdit::singleline(&mut state.login_password)
                .hint_text("Password")
                .password(true),
        );
        if password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            submit = true;
        }
        if ui.button("Sign in").clicked() {
            submit = true;
        }

        if let Some(notice) = &state.notice {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::LIGHT_RED, notice);
        }
    });

    if submit && !state.login_username.trim().is_empty() && !state.login_password.is_empty() {
        state.signing_in = true;
        return Some((
            state.login_username.trim().to_string(),
            state.login_password.clone(),
        ));
    }
    None
}
