pub(crate) mod health_check_controller;
pub(crate) mod push_controller;
pub(crate) mod sse_controller;
pub(crate) mod webhook_controller;
