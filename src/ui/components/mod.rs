pub mod chat_area;
pub mod input_bar;
pub mod login_panel;
pub mod navbar;
pub mod sidebar;
