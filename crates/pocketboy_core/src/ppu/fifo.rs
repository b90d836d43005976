//! Pixel FIFO: queued background/window pixels with sprite overlay
//! compositing.
//!
//! Entries carry the raw 2-bit color plus enough source information to
//! resolve palettes at pop time. Sprite pixels are composited onto the
//! first eight queued entries when a sprite fetch completes, following the
//! DMG or CGB priority rules.

use std::collections::VecDeque;

/// Where a queued pixel came from, with the palette data needed later.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PixelSource {
    Background {
        /// CGB palette index from the tile attribute byte (0 on DMG).
        palette: u8,
        /// BG-to-OAM priority bit of the tile attributes (CGB).
        priority: bool,
    },
    Sprite {
        /// OBP1 rather than OBP0 on DMG.
        obp1: bool,
        /// CGB palette index from the sprite attributes.
        palette: u8,
        /// Sprite-behind-background attribute bit.
        behind_bg: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelEntry {
    /// Raw 2-bit pixel value before palette lookup.
    pub color: u8,
    pub source: PixelSource,
}

#[derive(Clone)]
pub struct PixelFifo {
    pixels: VecDeque<PixelEntry>,
}

impl PixelFifo {
    pub fn new() -> Self {
        Self {
            pixels: VecDeque::with_capacity(16),
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn clear(&mut self) {
        self.pixels.clear();
    }

    /// Queue eight freshly fetched background/window pixels.
    pub fn push_row(&mut self, colors: [u8; 8], palette: u8, priority: bool) {
        for color in colors {
            self.pixels.push_back(PixelEntry {
                color,
                source: PixelSource::Background { palette, priority },
            });
        }
    }

    pub fn pop(&mut self) -> Option<PixelEntry> {
        self.pixels.pop_front()
    }

    /// Composite a fetched sprite row onto the head of the queue.
    ///
    /// `skip` is the number of sprite pixels already scrolled off the left
    /// edge. `master_priority` is LCDC bit 0: on CGB, clearing it puts
    /// sprites above everything; on DMG it blanks the background instead
    /// (handled at push time) so it plays no role here. Existing sprite
    /// pixels always win, which gives the lowest-OAM-index-first tie-break
    /// because sprites are composited in OAM order.
    pub fn overlay_sprite(
        &mut self,
        colors: [u8; 8],
        skip: u8,
        source: PixelSource,
        cgb: bool,
        master_priority: bool,
    ) {
        let behind_bg = match source {
            PixelSource::Sprite { behind_bg, .. } => behind_bg,
            PixelSource::Background { .. } => unreachable!("overlay source must be a sprite"),
        };
        for (pos, &color) in colors.iter().skip(skip as usize).enumerate() {
            let Some(existing) = self.pixels.get_mut(pos) else {
                break;
            };
            if color == 0 {
                continue;
            }
            match existing.source {
                PixelSource::Sprite { .. } => continue,
                PixelSource::Background { priority, .. } => {
                    let bg_opaque = existing.color != 0;
                    if cgb && !master_priority {
                        // Master priority off: sprites win unconditionally.
                    } else if cgb && priority && bg_opaque {
                        continue;
                    } else if behind_bg && bg_opaque {
                        continue;
                    }
                }
            }
            *existing = PixelEntry { color, source };
        }
    }
}

impl Default for PixelFifo {
    fn default() -> Self {
        Self::new()
    }
}
