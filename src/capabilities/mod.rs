mod api;

pub use self::api::{ApiError, ApiOperation, ApiOutput, ApiResult, TagApi};

// Render comes straight from Crux; it already does everything this page
// needs to trigger view updates.
pub use crux_core::render::Render;

use crate::app::App;
use crate::Event;

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub render: Render<Event>,
    pub api: TagApi<Event>,
}
