//! SSD1306 128x64 OLED behind the display controller

use badge_core::display::{DisplayPanel, Frame, render_frame};
use badge_core::framebuffer::MonoFrameBuffer;
use display_interface::DisplayError;
use log::info;
use ssd1306::mode::BufferedGraphicsModeAsync;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306Async};

use crate::app_state::{AppError, BusDevice, Subsystem};

type Driver = Ssd1306Async<
    I2CInterface<BusDevice>,
    DisplaySize128x64,
    BufferedGraphicsModeAsync<DisplaySize128x64>,
>;

pub struct OledPanel {
    driver: Driver,
    framebuffer: MonoFrameBuffer,
}

impl OledPanel {
    /// Initialise the panel at 0x3C, mirrored on both axes, initially off
    pub async fn init(bus: BusDevice) -> Result<Self, AppError> {
        let interface = I2CDisplayInterface::new(bus);
        let mut driver = Ssd1306Async::new(interface, DisplaySize128x64, DisplayRotation::Rotate180)
            .into_buffered_graphics_mode();
        driver
            .init()
            .await
            .map_err(|e| AppError::configuration(Subsystem::Display, e))?;
        driver
            .set_display_on(false)
            .await
            .map_err(|e| AppError::configuration(Subsystem::Display, e))?;
        info!("SSD1306 initialized");
        Ok(Self {
            driver,
            framebuffer: MonoFrameBuffer::new(),
        })
    }
}

impl DisplayPanel for OledPanel {
    type Error = DisplayError;

    async fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.driver.set_display_on(enabled).await
    }

    async fn show(&mut self, frame: &Frame) -> Result<(), Self::Error> {
        let Ok(()) = render_frame(frame, &mut self.framebuffer);
        self.framebuffer.flush(&mut self.driver)?;
        self.driver.flush().await
    }
}
