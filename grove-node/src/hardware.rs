//! Typed access to the GrovePi driver functions
//!
//! Each operation is one bridge call. Reads return `-1` and writes return
//! `-1` status when the call produced no usable result; nothing is retried.

use std::sync::Arc;

use grove_bridge::{Bridge, Scalar};

pub const SENSOR_READ_TEMP: &str = "sensor_read_temp";
pub const SENSOR_READ_HUMIDITY: &str = "sensor_read_humidity";
pub const SENSOR_READ_LIGHT: &str = "sensor_read_light";
pub const LED_WRITE_RED: &str = "led_write_red";
pub const LED_WRITE_GREEN: &str = "led_write_green";
pub const LED_WRITE_BLUE: &str = "led_write_blue";
pub const LCD_WRITE_STR: &str = "lcd_write_str";

/// One channel of the RGB LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedChannel {
    Red,
    Green,
    Blue,
}

impl LedChannel {
    pub const ALL: [LedChannel; 3] = [LedChannel::Red, LedChannel::Green, LedChannel::Blue];

    /// Field name in the LED representation
    pub fn field(self) -> &'static str {
        match self {
            LedChannel::Red => "red",
            LedChannel::Green => "green",
            LedChannel::Blue => "blue",
        }
    }

    fn function(self) -> &'static str {
        match self {
            LedChannel::Red => LED_WRITE_RED,
            LedChannel::Green => LED_WRITE_GREEN,
            LedChannel::Blue => LED_WRITE_BLUE,
        }
    }
}

pub struct Hardware<B> {
    bridge: Arc<B>,
}

impl<B: Bridge> Hardware<B> {
    pub fn new(bridge: Arc<B>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &Arc<B> {
        &self.bridge
    }

    /// Temperature in degrees Celsius, or -1
    pub async fn sensor_read_temp(&self) -> f64 {
        self.read_f64(SENSOR_READ_TEMP).await
    }

    /// Relative humidity in percent, or -1
    pub async fn sensor_read_humidity(&self) -> f64 {
        self.read_f64(SENSOR_READ_HUMIDITY).await
    }

    /// Raw light sensor level, or -1
    pub async fn sensor_read_light(&self) -> i64 {
        match self.bridge.call(SENSOR_READ_LIGHT, None).await {
            Some(result) => result.as_i64().unwrap_or_else(|| {
                tracing::warn!(func = SENSOR_READ_LIGHT, ?result, "driver returned a non-integer");
                -1
            }),
            None => -1,
        }
    }

    pub async fn led_write(&self, channel: LedChannel, status: i64) -> i32 {
        self.write(channel.function(), Scalar::Int(status)).await
    }

    pub async fn led_write_red(&self, status: i64) -> i32 {
        self.led_write(LedChannel::Red, status).await
    }

    pub async fn led_write_green(&self, status: i64) -> i32 {
        self.led_write(LedChannel::Green, status).await
    }

    pub async fn led_write_blue(&self, status: i64) -> i32 {
        self.led_write(LedChannel::Blue, status).await
    }

    pub async fn lcd_write_str(&self, text: &str) -> i32 {
        self.write(LCD_WRITE_STR, Scalar::from(text)).await
    }

    async fn read_f64(&self, function: &str) -> f64 {
        match self.bridge.call(function, None).await {
            Some(result) => result.as_f64().unwrap_or_else(|| {
                tracing::warn!(func = function, ?result, "driver returned a non-number");
                -1.0
            }),
            None => -1.0,
        }
    }

    async fn write(&self, function: &str, arg: Scalar) -> i32 {
        match self.bridge.call(function, Some(arg)).await {
            Some(_) => 0,
            None => -1,
        }
    }
}
