pub mod common;

mod auth_flow;
mod dispatch_and_errors;
mod single_flight;
