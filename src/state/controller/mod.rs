mod app;
mod details;
mod inventory;
mod operations;

pub(crate) use app::AppController;
