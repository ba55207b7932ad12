use eframe::egui;

/// Returns the text to send once the user submits. Input is kept while `enabled` is false.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, enabled: bool) -> Option<String> {
    let mut send = false;
    ui.horizontal(|ui| {
        let hint = if enabled {
            "Ask anything..."
        } else {
            "Waiting for the assistant..."
        };
        let response = ui.add_enabled(
            enabled,
            egui::TextEdit::singleline(input_text)
                .hint_text(hint)
                .desired_width(ui.available_width() - 70.0),
        );
        if ui.add_enabled(enabled, egui::Button::new("Send")).clicked() {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
            response.request_focus();
        }
    });

    if send && enabled && !input_text.trim().is_empty() {
        return Some(std::mem::take(input_text));
    }

    None
}
