pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod user;

pub use order::OrderStatus;
pub use product::ImageGallery;
pub use user::UserRole;
