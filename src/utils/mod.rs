pub mod scoped_timer;

pub mod time;
