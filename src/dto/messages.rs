use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Message;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    pub image: Option<String>,
}

impl SendMessageRequest {
    /// Trimmed text and image; empty strings when absent.
    pub fn normalized(self) -> (String, String) {
        let text = self.text.unwrap_or_default().trim().to_string();
        let image = self.image.unwrap_or_default().trim().to_string();
        (text, image)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct MessageList {
    #[schema(value_type = Vec<Message>)]
    pub items: Vec<Message>,
}
