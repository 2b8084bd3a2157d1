pub mod cmd;
pub mod dispatch;
pub mod output;
