mod device;
mod preferences;
mod settings;

pub use device::*;
pub use preferences::*;
pub use settings::*;
