mod device_id;
mod user_id;

pub use device_id::DeviceId;
pub use user_id::UserId;
