pub mod config;

pub mod economics;

pub mod notification;

pub mod sim_error;
