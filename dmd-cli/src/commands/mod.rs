pub mod autostart;
pub mod current;
pub mod daemon;
pub mod list;
pub mod logs;
pub mod run;
