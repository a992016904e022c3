/// Preview window for a finished overlay
///
/// Shows the rasterized figure as a single texture. The window is read-only:
/// everything that affects the plot lives in the configuration file.

use crate::render::export::rasterize;
use crate::render::figure::Figure;

pub struct ContourViewer {
    image: Option<egui::ColorImage>,
    texture: Option<egui::TextureHandle>,
    title: String,
}

impl ContourViewer {
    pub fn new(figure: &Figure, width: u32, height: u32, title: &str) -> Self {
        let raster = rasterize(&figure.scene(width, height));
        let size = [raster.width() as usize, raster.height() as usize];
        Self {
            image: Some(egui::ColorImage::from_rgb(size, raster.as_raw())),
            texture: None,
            title: title.to_string(),
        }
    }

    pub fn image_size(&self) -> Option<[usize; 2]> {
        match (&self.texture, &self.image) {
            (Some(t), _) => Some(t.size()),
            (None, Some(img)) => Some(img.size),
            _ => None,
        }
    }
}

impl eframe::App for ContourViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(image) = self.image.take() {
            self.texture = Some(ctx.load_texture("overlay", image, egui::TextureOptions::LINEAR));
        }
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(&self.title);
            if let Some(texture) = &self.texture {
                ui.add(egui::Image::new(texture).shrink_to_fit());
            }
        });
    }
}

/// Open a blocking window showing `figure`.
pub fn show(figure: &Figure, width: u32, height: u32, title: &str) -> eframe::Result<()> {
    let viewer = ContourViewer::new(figure, width, height, title);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([width as f32 * 0.6, height as f32 * 0.6 + 40.0])
            .with_min_inner_size([400.0, 300.0])
            .with_title(title),
        ..Default::default()
    };
    log::info!("Opening viewer ({}x{})", width, height);
    eframe::run_native(
        "NMR Contour Overlay",
        options,
        Box::new(|_cc| Ok(Box::new(viewer))),
    )
}
