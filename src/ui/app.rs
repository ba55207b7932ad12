use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{SessionCommand, SessionEvent};

use super::components::navbar::NavAction;
use super::components::sidebar::SidebarAction;
use super::components::{chat_area, input_bar, login_panel, navbar, sidebar};
use super::state::AppState;

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<SessionCommand>,
    event_receiver: mpsc::Receiver<SessionEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<SessionCommand>,
        event_receiver: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            state: AppState::new(),
            command_sender,
            event_receiver,
        }
    }

    fn handle_session_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            if let SessionEvent::Error(err) = &event {
                log::warn!("Session error: {err}");
            }
            self.state.apply(event);
        }
    }

    fn send_command(&mut self, command: SessionCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to session: {err}");
        }
    }

    fn show_session(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("navbar").show(ctx, |ui| {
            match navbar::render(ui, &mut self.state) {
                Some(NavAction::Reconnect) => self.send_command(SessionCommand::Reconnect),
                Some(NavAction::Logout) => self.send_command(SessionCommand::Logout),
                Some(NavAction::UpdateProfile { name, image }) => {
                    self.send_command(SessionCommand::UpdateProfile { name, image })
                }
                None => {}
            }
        });

        egui::SidePanel::left("conversations")
            .default_width(220.0)
            .show(ctx, |ui| {
                let command = match sidebar::render(ui, &self.state) {
                    Some(SidebarAction::NewChat) => SessionCommand::NewChat,
                    Some(SidebarAction::Refresh) => SessionCommand::RefreshConversations,
                    Some(SidebarAction::Select(chat_id)) => {
                        SessionCommand::SelectConversation(chat_id)
                    }
                    Some(SidebarAction::Delete(chat_id)) => {
                        SessionCommand::DeleteConversation(chat_id)
                    }
                    None => return,
                };
                self.send_command(command);
            });

        egui::TopBottomPanel::bottom("input_bar").show(ctx, |ui| {
            if let Some(notice) = self.state.notice.clone() {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::LIGHT_RED, notice);
                    if ui.small_button("✕").clicked() {
                        self.state.notice = None;
                    }
                });
            }

            let enabled = self.state.session.can_send();
            if let Some(content) = input_bar::render(ui, &mut self.state.input_text, enabled) {
                self.send_command(SessionCommand::SendMessage(content));
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            chat_area::render(ui, &self.state.session);
        });
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_session_events();

        if self.state.user.is_some() {
            self.show_session(ctx);
        } else {
            egui::CentralPanel::default().show(ctx, |ui| {
                if let Some((username, password)) = login_panel::render(ui, &mut self.state) {
                    self.send_command(SessionCommand::Login { username, password });
                }
            });
        }

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
