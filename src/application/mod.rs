pub mod list_controller;
pub mod order_form;
pub mod order_service;
