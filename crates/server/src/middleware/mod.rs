pub mod print_panics;
pub mod request_counter;
pub mod request_id;
pub mod request_logging;
