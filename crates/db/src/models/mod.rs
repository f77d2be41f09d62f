pub mod email_template;
pub mod user;
