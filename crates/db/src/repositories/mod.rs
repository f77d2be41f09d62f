pub mod email_template_repo;
pub mod user_repo;

pub use email_template_repo::EmailTemplateRepo;
pub use user_repo::UserRepo;
