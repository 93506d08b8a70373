//! Tile planning for bounded-memory inference on large inputs.
//!
//! The image is covered by a row-major grid of `tile × tile` core
//! rectangles. Each core is inflated by `pad` pixels on every side (clipped
//! to the image) so the network sees context across tile seams; after
//! inference only the core region of the output is kept.

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One unit of tiled inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    /// Region of the input this tile is responsible for.
    pub core: Rect,
    /// Region actually fed to the model (core plus clipped overlap).
    pub padded: Rect,
}

impl Tile {
    /// Offset of the core inside the padded region, in input pixels.
    pub fn core_offset(&self) -> (u32, u32) {
        (self.core.x - self.padded.x, self.core.y - self.padded.y)
    }
}

/// Tiling configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileConfig {
    pub enabled: bool,
    /// Core tile edge length in input pixels.
    pub tile: u32,
    /// Overlap added around each core tile.
    pub pad: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tile: 192,
            pad: 24,
        }
    }
}

impl TileConfig {
    /// Whether an image of the given size is split into tiles.
    pub fn should_tile(&self, width: u32, height: u32) -> bool {
        self.enabled && self.tile > 0 && (width > self.tile || height > self.tile)
    }
}

/// Plan the tiles covering a `width × height` image.
///
/// Cores never overlap and their union is the whole image. Returns an empty
/// plan for an empty image or a zero tile size.
pub fn plan_tiles(width: u32, height: u32, cfg: &TileConfig) -> Vec<Tile> {
    if width == 0 || height == 0 || cfg.tile == 0 {
        return Vec::new();
    }

    let mut tiles = Vec::new();
    let mut y = 0;
    while y < height {
        let th = cfg.tile.min(height - y);
        let y0 = y.saturating_sub(cfg.pad);
        let y1 = (y + th).saturating_add(cfg.pad).min(height);

        let mut x = 0;
        while x < width {
            let tw = cfg.tile.min(width - x);
            let x0 = x.saturating_sub(cfg.pad);
            let x1 = (x + tw).saturating_add(cfg.pad).min(width);

            tiles.push(Tile {
                core: Rect {
                    x,
                    y,
                    width: tw,
                    height: th,
                },
                padded: Rect {
                    x: x0,
                    y: y0,
                    width: x1 - x0,
                    height: y1 - y0,
                },
            });
            x += cfg.tile;
        }
        y += cfg.tile;
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_are_not_tiled() {
        let cfg = TileConfig::default();
        assert!(!cfg.should_tile(100, 100));
        assert!(!cfg.should_tile(192, 192));
        assert!(cfg.should_tile(193, 10));
        assert!(!TileConfig { enabled: false, ..cfg }.should_tile(4000, 4000));
    }

    #[test]
    fn cores_cover_image_exactly_once() {
        let cfg = TileConfig {
            enabled: true,
            tile: 64,
            pad: 8,
        };
        let (w, h) = (150u32, 97u32);
        let tiles = plan_tiles(w, h, &cfg);
        assert_eq!(tiles.len(), 3 * 2);

        let mut hits = vec![0u8; (w * h) as usize];
        for t in &tiles {
            for y in t.core.y..t.core.y + t.core.height {
                for x in t.core.x..t.core.x + t.core.width {
                    hits[(y * w + x) as usize] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&n| n == 1), "every pixel belongs to one core");
    }

    #[test]
    fn padding_is_clipped_to_bounds() {
        let cfg = TileConfig {
            enabled: true,
            tile: 64,
            pad: 8,
        };
        let tiles = plan_tiles(150, 97, &cfg);

        let first = tiles[0];
        assert_eq!(first.padded.x, 0);
        assert_eq!(first.padded.y, 0);
        assert_eq!(first.padded.width, 72);
        assert_eq!(first.core_offset(), (0, 0));

        let middle = tiles[1];
        assert_eq!(middle.core.x, 64);
        assert_eq!(middle.padded.x, 56);
        assert_eq!(middle.padded.width, 80);
        assert_eq!(middle.core_offset(), (8, 0));

        let last = *tiles.last().unwrap();
        assert_eq!(last.core.width, 150 - 128);
        assert_eq!(last.core.height, 97 - 64);
        assert_eq!(last.padded.x + last.padded.width, 150);
        assert_eq!(last.padded.y + last.padded.height, 97);
    }

    #[test]
    fn huge_padding_saturates_to_whole_image() {
        let cfg = TileConfig {
            enabled: true,
            tile: 128,
            pad: u32::MAX,
        };
        let tiles = plan_tiles(300, 300, &cfg);
        assert_eq!(tiles.len(), 9);
        for t in &tiles {
            assert_eq!(
                t.padded,
                Rect {
                    x: 0,
                    y: 0,
                    width: 300,
                    height: 300
                }
            );
        }
        assert_eq!(tiles[4].core_offset(), (128, 128));
    }

    #[test]
    fn degenerate_inputs_yield_empty_plan() {
        assert!(plan_tiles(0, 10, &TileConfig::default()).is_empty());
        let zero = TileConfig {
            enabled: true,
            tile: 0,
            pad: 0,
        };
        assert!(plan_tiles(10, 10, &zero).is_empty());
    }
}
