use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AuthResponse, LoginRequest, RefreshTokenRequest, RegisterRequest},
        cart::{AddCartItemRequest, UpdateCartItemRequest},
        messages::{MessageList, SendMessageRequest},
        orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        users::{CreateUserRequest, OrderStats, StatsResponse, UpdateUserRequest, UserList},
    },
    entity::enums::{OrderStatus, ProductStatus, RoleName, UserStatus},
    models::{
        Cart, CartItem, Message, Order, OrderItem, Product, Role, ShippingAddress, User,
        UserSummary,
    },
    response::{ApiResponse, Meta},
    routes::{auth, cart, health, messages, orders, params, products, roles, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::refresh,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order_status,
        users::list_users,
        users::profile,
        users::stats,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        roles::list_roles,
        messages::chat_users,
        messages::conversation,
        messages::send_message
    ),
    components(
        schemas(
            RoleName,
            UserStatus,
            ProductStatus,
            OrderStatus,
            Role,
            User,
            UserSummary,
            Product,
            Cart,
            CartItem,
            ShippingAddress,
            Order,
            OrderItem,
            Message,
            RegisterRequest,
            LoginRequest,
            RefreshTokenRequest,
            AuthResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            AddCartItemRequest,
            UpdateCartItemRequest,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderWithItems,
            OrderList,
            CreateUserRequest,
            UpdateUserRequest,
            UserList,
            OrderStats,
            StatsResponse,
            SendMessageRequest,
            MessageList,
            params::Pagination,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Cart>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<AuthResponse>,
            ApiResponse<User>,
            ApiResponse<UserList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and token refresh"),
        (name = "Products", description = "Catalog; writes are admin only"),
        (name = "Cart", description = "The caller's cart"),
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Users", description = "User administration and profile"),
        (name = "Roles", description = "Role listing"),
        (name = "Messages", description = "Admin chat"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
