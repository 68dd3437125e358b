mod devices;
mod groups;
mod health;
mod models;
mod router;
mod stats;
