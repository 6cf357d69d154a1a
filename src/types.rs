use serde::{Deserialize, Serialize};

use crate::widgets::ImageData;

// JSON payloads stored in `widgets.payload`, keyed by `widgets.kind`.

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct TextPayload { pub text: String }

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ImagePayload { pub images: Vec<ImageData> }
