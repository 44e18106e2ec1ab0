mod controller;
mod line;

pub use controller::LightController;
pub use line::{
    list_gpio_chips, resolve_sysfs_line, GpioChip, OutputLine, SimulatedOutputLine,
    SysfsOutputLine,
};
