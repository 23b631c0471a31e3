mod doctor;
mod lifecycle;
mod logs;
mod port;
mod service;
mod store;

pub use doctor::run_doctor;
pub use lifecycle::{run_auto, run_list, run_restart, run_set_autostart, run_start, run_stop};
pub use logs::run_logs;
pub use port::run_kill_port;
pub use service::{
    run_edit, run_register, run_show, run_unregister, EditArgs, RegisterArgs,
};
pub use store::{
    run_add_range, run_backup, run_backups, run_import, run_ranges, run_recover, run_restore,
};
