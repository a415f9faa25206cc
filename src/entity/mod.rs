pub mod cart_items;
pub mod carts;
pub mod enums;
pub mod messages;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod roles;
pub mod users;

pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use messages::Entity as Messages;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use roles::Entity as Roles;
pub use users::Entity as Users;
