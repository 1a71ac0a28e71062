use sdl2::pixels::PixelFormatEnum;
use sdl2::render::WindowCanvas;

use okto_core::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use okto_core::Framebuffer;

/// # Display
/// Renders the 64x32 monochrome framebuffer into an SDL2 window,
/// scaled up by an integer factor. The window only gets a `render`
/// call when the machine reports a freshly drawn frame.
pub struct Display {
    canvas: WindowCanvas,
    width: usize,
    height: usize,
}

impl Display {
    /// Creates a new display bound to an SDL2 context.
    ///
    /// # Arguments
    /// * `sdl` an SDL2 context with which to draw
    /// * `scale` the size multiplier for each machine pixel
    pub fn new(sdl: &sdl2::Sdl, scale: u32) -> Result<Self, String> {
        let video = sdl.video()?;
        let window = video
            .window(
                "Okto",
                DISPLAY_WIDTH as u32 * scale,
                DISPLAY_HEIGHT as u32 * scale,
            )
            .position_centered()
            .opengl()
            .build()
            .map_err(|e| e.to_string())?;
        let canvas = window.into_canvas().build().map_err(|e| e.to_string())?;

        Ok(Display {
            canvas,
            width: DISPLAY_WIDTH,
            height: DISPLAY_HEIGHT,
        })
    }

    /// Formats a framebuffer for rendering as an SDL2 texture.
    ///
    /// An SDL2 RGB24 texture is a 1D array of bytes representing
    /// concatenated rows of RGB pixels. This creates a black and
    /// white rendering by:
    /// - flattening the 2D pixel grid by concatenating its rows
    /// - triplicating each pixel into its R, G, and B bytes
    /// - multiplying each value by 255 to go from binary to intensity
    ///
    /// # Arguments
    /// * `frame` a machine framebuffer
    fn frame_to_texture(frame: &Framebuffer) -> Vec<u8> {
        frame
            .pixels()
            .iter()
            .flat_map(|row| row.iter())
            .flat_map(|&pixel| std::iter::repeat(pixel * 255).take(3))
            .collect()
    }

    /// Uploads the framebuffer as an RGB24 streaming texture and
    /// presents it.
    ///
    /// # Arguments
    /// * `frame` a machine framebuffer
    pub fn render(&mut self, frame: &Framebuffer) -> Result<(), String> {
        let texture_creator = self.canvas.texture_creator();

        let mut texture = texture_creator
            .create_texture_streaming(
                PixelFormatEnum::RGB24,
                self.width as u32,
                self.height as u32,
            )
            .map_err(|e| e.to_string())?;

        texture.with_lock(None, |buffer: &mut [u8], _pitch: usize| {
            buffer.copy_from_slice(&Display::frame_to_texture(frame));
        })?;

        self.canvas.copy(&texture, None, None)?;
        self.canvas.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_to_texture() {
        let mut frame = Framebuffer::new();
        // pixel (1, 0) and pixel (0, 1)
        frame.blit_sprite(1, 0, &[0x80]);
        frame.blit_sprite(0, 1, &[0x80]);
        let texture = Display::frame_to_texture(&frame);

        let mut expected: Vec<u8> = vec![0; 6144];
        expected[0..6].copy_from_slice(&[0, 0, 0, 255, 255, 255]);
        expected[192..198].copy_from_slice(&[255, 255, 255, 0, 0, 0]);

        assert_eq!(texture, expected);
    }
}
