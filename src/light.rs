//! Individual light control.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::{Value, json};

use crate::bridge::CommandSink;
use crate::inventory::LightEntry;
use crate::types::{Gamut, GamutTriangle, Point, PowerMode};

/// A single light taken over from the bridge.
///
/// A `Light` is created from the bridge's inventory entry and remembers the
/// state the light was in at that moment. That state is sent back to the
/// bridge when the `Light` is dropped, so the lamp is never left under
/// automation control.
///
/// Commands go out through a [`CommandSink`] and are fire-and-forget.
pub struct Light {
    id: u16,
    model_id: String,
    name: String,
    gamut: Gamut,
    triangle: GamutTriangle,
    power: PowerMode,
    color: Point,
    /// Last colour passed to `set_color`, before any brightness rescaling.
    requested: Point,
    transition_time: u16,
    original_state: Value,
    sink: Arc<dyn CommandSink>,
}

impl fmt::Debug for Light {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Light")
            .field("id", &self.id)
            .field("model_id", &self.model_id)
            .field("name", &self.name)
            .field("gamut", &self.gamut)
            .field("power", &self.power)
            .field("color", &self.color)
            .field("transition_time", &self.transition_time)
            .finish()
    }
}

impl Light {
    /// Highest brightness value the bridge accepts in control commands.
    pub const MAX_BRIGHTNESS: f64 = 254.0;

    pub fn new(id: u16, entry: &LightEntry, sink: Arc<dyn CommandSink>) -> Self {
        let state = &entry.state;
        let on = state.on.unwrap_or_else(|| {
            error!("Light {id}: state has no 'on' field, assuming off");
            false
        });

        let mut original_state = json!({ "on": on });
        let mut color = Point::default();
        let mut transition_time = 0;
        if on {
            let [x, y] = state.xy.unwrap_or_default();
            let bri = state.bri.unwrap_or_default();
            original_state["xy"] = json!([x, y]);
            original_state["bri"] = json!(bri);
            color = Point::new(x, y, f64::from(bri) / 255.0);
            transition_time = state.transition_time.unwrap_or_default();
        }

        let gamut = Gamut::classify(&entry.model_id).unwrap_or_else(|| {
            warn!(
                "Light {id}: no known gamut for model {:?}, using full triangle",
                entry.model_id
            );
            Gamut::Full
        });

        info!(
            "Light {id} found: {:?} model {} (gamut {gamut})",
            entry.name, entry.model_id
        );

        Self {
            id,
            model_id: entry.model_id.clone(),
            name: entry.name.clone(),
            gamut,
            triangle: gamut.triangle(),
            power: PowerMode::from(on),
            color,
            requested: color,
            transition_time,
            original_state,
            sink,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gamut(&self) -> Gamut {
        self.gamut
    }

    pub fn triangle(&self) -> &GamutTriangle {
        &self.triangle
    }

    pub fn power(&self) -> PowerMode {
        self.power
    }

    pub fn color(&self) -> Point {
        self.color
    }

    pub fn transition_time(&self) -> u16 {
        self.transition_time
    }

    /// State captured at creation, re-sent on drop.
    pub fn original_state(&self) -> &Value {
        &self.original_state
    }

    pub fn set_on(&mut self, on: bool) {
        let power = PowerMode::from(on);
        if self.power != power {
            self.send(json!({ "on": on }));
        }
        self.power = power;
    }

    /// Transition time in deciseconds.
    pub fn set_transition_time(&mut self, transition_time: u16) {
        if self.transition_time != transition_time {
            self.send(json!({ "transitiontime": transition_time }));
        }
        self.transition_time = transition_time;
    }

    /// Set a new colour if it differs from the last one requested.
    ///
    /// Over the control channel the colour is sent right away with the
    /// brightness scaled to the bridge's 1-254 range. In streaming mode the
    /// brightness is rescaled into `[0, max]` and only stored; the stream
    /// picks it up on its next tick.
    pub fn set_color(
        &mut self,
        color: Point,
        brightness_factor: f64,
        brightness_min: f64,
        brightness_max: f64,
        streaming: bool,
    ) {
        if self.requested == color {
            return;
        }
        self.requested = color;

        if streaming {
            let max = brightness_max.max(0.0).min(1.0);
            let min = brightness_min.max(0.0).min(max);
            let brightness = (brightness_factor * color.brightness.clamp(min, max)).clamp(0.0, max);
            self.color = color.with_brightness(brightness);
        } else {
            let bri = (brightness_factor * (color.brightness * Self::MAX_BRIGHTNESS).max(1.0))
                .min(Self::MAX_BRIGHTNESS)
                .round();
            self.send(json!({ "xy": [color.x, color.y], "bri": bri as u8 }));
            self.color = color;
        }
    }

    fn send(&self, body: Value) {
        debug!("Light {}: {body}", self.id);
        self.sink.post(&self.state_route(), body);
    }

    fn state_route(&self) -> String {
        format!("lights/{}/state", self.id)
    }
}

impl Drop for Light {
    fn drop(&mut self) {
        debug!("Light {}: restoring {}", self.id, self.original_state);
        self.sink
            .post(&self.state_route(), std::mem::take(&mut self.original_state));
    }
}
