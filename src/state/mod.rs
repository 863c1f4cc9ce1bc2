pub(crate) mod batch;
pub(crate) mod controller;
pub(crate) mod loader;
pub(crate) mod search;
pub(crate) mod selection;
pub(crate) mod types;
pub(crate) mod view;

pub(crate) use controller::AppController;
