use super::*;
use crate::bus::AddressSpace;
use crate::display::{FrameBuffer, NullDisplay};
use pocketboy_common::Color;

fn dmg_ppu() -> Ppu {
    Ppu::new(false, true)
}

fn run_dots(ppu: &mut Ppu, display: &mut dyn crate::display::Display, dots: u32) {
    for _ in 0..dots {
        ppu.dot(display, false);
    }
}

#[test]
fn a_line_is_exactly_456_dots_with_the_documented_mode_sequence() {
    let mut ppu = dmg_ppu();
    let mut display = NullDisplay;

    let mut oam = 0u32;
    let mut transfer = 0u32;
    let mut hblank = 0u32;
    let mut dots = 0u32;
    while ppu.ly() == 0 {
        // Attribute each dot to the mode it is spent in.
        match ppu.mode() {
            Mode::OamSearch => oam += 1,
            Mode::PixelTransfer => transfer += 1,
            Mode::HBlank => hblank += 1,
            Mode::VBlank => panic!("VBlank on line 0"),
        }
        ppu.dot(&mut display, false);
        dots += 1;
        assert!(dots <= TICKS_PER_LINE, "line overran");
    }
    assert_eq!(dots, TICKS_PER_LINE);
    assert_eq!(oam, 80);
    assert!(
        (172..=289).contains(&transfer),
        "pixel transfer took {transfer} dots"
    );
    assert_eq!(oam + transfer + hblank, TICKS_PER_LINE);
}

#[test]
fn a_frame_is_exactly_70224_dots() {
    let mut ppu = dmg_ppu();
    let mut display = NullDisplay;

    // Run to the start of the first VBlank.
    let mut dots_to_vblank = 0u32;
    while ppu.dot(&mut display, false) != Mode::VBlank {
        dots_to_vblank += 1;
        assert!(dots_to_vblank < crate::TICKS_PER_FRAME);
    }
    assert_eq!(dots_to_vblank, 144 * TICKS_PER_LINE - 1);

    // VBlank covers lines 144-153, then the next frame starts at LY 0.
    let mut vblank_dots = 1u32; // the entry dot above
    loop {
        let mode = ppu.dot(&mut display, false);
        if mode != Mode::VBlank {
            break;
        }
        vblank_dots += 1;
        assert!((144..=153).contains(&ppu.ly()));
    }
    assert_eq!(ppu.ly(), 0);
    assert_eq!(vblank_dots, 10 * TICKS_PER_LINE);
}

#[test]
fn vram_is_blocked_during_pixel_transfer_and_oam_during_search() {
    let mut ppu = dmg_ppu();
    let mut display = NullDisplay;

    // Mode 2 right after power-on: OAM locked, VRAM open.
    assert_eq!(ppu.mode(), Mode::OamSearch);
    ppu.write(0xFE00, 0x12);
    assert_eq!(ppu.read(0xFE00), 0xFF);
    ppu.write(0x8000, 0x34);
    assert_eq!(ppu.read(0x8000), 0x34);

    // Advance into mode 3: both locked.
    while ppu.mode() != Mode::PixelTransfer {
        ppu.dot(&mut display, false);
    }
    ppu.write(0x8000, 0x56);
    assert_eq!(ppu.read(0x8000), 0xFF);

    // HBlank: both open again.
    while ppu.mode() != Mode::HBlank {
        ppu.dot(&mut display, false);
    }
    assert_eq!(ppu.read(0x8000), 0x34);
    ppu.write(0xFE00, 0x9A);
    assert_eq!(ppu.read(0xFE00), 0x9A);
}

#[test]
fn disabling_the_lcd_forces_hblank_and_notifies_once() {
    let mut ppu = dmg_ppu();
    let mut display = NullDisplay;
    run_dots(&mut ppu, &mut display, 1000);
    assert_ne!(ppu.mode(), Mode::HBlank);

    ppu.write(0xFF40, 0x11);
    assert_eq!(ppu.mode(), Mode::HBlank);
    assert_eq!(ppu.ly(), 0);
    assert_eq!(ppu.take_lcd_switch(), Some(false));
    assert_eq!(ppu.take_lcd_switch(), None);

    // Stays in HBlank while off.
    run_dots(&mut ppu, &mut display, 2000);
    assert_eq!(ppu.mode(), Mode::HBlank);
}

#[test]
fn reenabling_the_lcd_resumes_oam_search_after_244_dots() {
    let mut ppu = dmg_ppu();
    let mut display = NullDisplay;
    ppu.write(0xFF40, 0x11);
    ppu.take_lcd_switch();
    run_dots(&mut ppu, &mut display, 500);

    ppu.write(0xFF40, 0x91);
    assert_eq!(ppu.take_lcd_switch(), Some(true));
    for _ in 0..243 {
        assert_eq!(ppu.dot(&mut display, false), Mode::HBlank);
    }
    ppu.dot(&mut display, false);
    assert_eq!(ppu.mode(), Mode::OamSearch);
    assert_eq!(ppu.ly(), 0);
}

#[test]
fn background_tiles_reach_the_framebuffer() {
    let mut ppu = dmg_ppu();
    let mut display = FrameBuffer::new();

    // LCD off while setting up VRAM: tile 1 solid color 3, map cell (0,0).
    ppu.write(0xFF40, 0x11);
    ppu.take_lcd_switch();
    for i in 0..16 {
        ppu.write(0x8010 + i, 0xFF);
    }
    ppu.write(0x9800, 0x01);
    ppu.write(0xFF47, 0xE4);
    ppu.write(0xFF40, 0x91);
    ppu.take_lcd_switch();

    // One full frame plus the enable delay.
    run_dots(&mut ppu, &mut display, 244 + crate::TICKS_PER_FRAME);
    assert_eq!(display.frames(), 0); // frame_ready is the scheduler's job

    let pixels = display.pixels();
    // Tile (0,0) is darkest; the rest of its row is lightest.
    assert_eq!(pixels[0], Color::DMG_SHADES[3]);
    assert_eq!(pixels[7], Color::DMG_SHADES[3]);
    assert_eq!(pixels[8], Color::DMG_SHADES[0]);
    // Row 8 is below the tile.
    assert_eq!(pixels[8 * crate::SCREEN_WIDTH], Color::DMG_SHADES[0]);
}

#[test]
fn sprites_overlay_the_background() {
    let mut ppu = dmg_ppu();
    let mut display = FrameBuffer::new();

    ppu.write(0xFF40, 0x11);
    ppu.take_lcd_switch();
    // Sprite tile 2: solid color 1 rows.
    for i in 0..16 {
        ppu.write(0x8020 + i, if i % 2 == 0 { 0xFF } else { 0x00 });
    }
    // Sprite 0 at screen (4, 0) using tile 2.
    ppu.write(0xFE00, 16); // y
    ppu.write(0xFE01, 12); // x
    ppu.write(0xFE02, 0x02); // tile
    ppu.write(0xFE03, 0x00); // attrs
    ppu.write(0xFF47, 0xE4);
    ppu.write(0xFF48, 0xE4);
    // Sprites enabled, 8x8, background enabled.
    ppu.write(0xFF40, 0x93);
    ppu.take_lcd_switch();

    run_dots(&mut ppu, &mut display, 244 + crate::TICKS_PER_FRAME);

    let pixels = display.pixels();
    assert_eq!(pixels[3], Color::DMG_SHADES[0]);
    // Sprite pixels at x = 4..12 get shade 1.
    assert_eq!(pixels[4], Color::DMG_SHADES[1]);
    assert_eq!(pixels[11], Color::DMG_SHADES[1]);
    assert_eq!(pixels[12], Color::DMG_SHADES[0]);
}

#[test]
fn window_replaces_the_background_from_wx() {
    let mut ppu = dmg_ppu();
    let mut display = FrameBuffer::new();

    ppu.write(0xFF40, 0x11);
    ppu.take_lcd_switch();
    // Window map (0x9C00) filled with tile 1 (solid 3); bg map stays tile 0.
    for i in 0..16 {
        ppu.write(0x8010 + i, 0xFF);
    }
    for i in 0..32 {
        ppu.write(0x9C00 + i, 0x01);
    }
    ppu.write(0xFF47, 0xE4);
    ppu.write(0xFF4A, 0x00); // WY
    ppu.write(0xFF4B, 0x57); // WX = 0x57 -> screen x 80
    // LCD on, window enabled with the 0x9C00 map, bg on.
    ppu.write(0xFF40, 0xF1);
    ppu.take_lcd_switch();

    run_dots(&mut ppu, &mut display, 244 + crate::TICKS_PER_FRAME);

    let pixels = display.pixels();
    assert_eq!(pixels[79], Color::DMG_SHADES[0]);
    assert_eq!(pixels[80], Color::DMG_SHADES[3]);
    assert_eq!(pixels[159], Color::DMG_SHADES[3]);
}

#[test]
fn cgb_palette_ram_colors_pixels() {
    let mut ppu = Ppu::new(true, true);
    let mut display = FrameBuffer::new();

    ppu.write(0xFF40, 0x11);
    ppu.take_lcd_switch();
    for i in 0..16 {
        ppu.write(0x8010 + i, 0xFF);
    }
    ppu.write(0x9800, 0x01);
    // BG palette 0 color 3 = pure red (BGR555 0x001F).
    ppu.write(0xFF68, 0x80 | 6);
    ppu.write(0xFF69, 0x1F);
    ppu.write(0xFF69, 0x00);
    ppu.write(0xFF40, 0x91);
    ppu.take_lcd_switch();

    run_dots(&mut ppu, &mut display, 244 + crate::TICKS_PER_FRAME);
    assert_eq!(display.pixels()[0].rgb(), (0xFF, 0x00, 0x00));
}

#[test]
fn scx_fine_scroll_shifts_the_line() {
    let mut ppu = dmg_ppu();
    let mut display = FrameBuffer::new();

    ppu.write(0xFF40, 0x11);
    ppu.take_lcd_switch();
    // Tile 1 solid 3 in map cell (0,0); everything else tile 0.
    for i in 0..16 {
        ppu.write(0x8010 + i, 0xFF);
    }
    ppu.write(0x9800, 0x01);
    ppu.write(0xFF47, 0xE4);
    ppu.write(0xFF43, 3); // SCX
    ppu.write(0xFF40, 0x91);
    ppu.take_lcd_switch();

    run_dots(&mut ppu, &mut display, 244 + crate::TICKS_PER_FRAME);

    let pixels = display.pixels();
    // With SCX=3 the first 5 pixels of tile 0 remain visible.
    assert_eq!(pixels[0], Color::DMG_SHADES[3]);
    assert_eq!(pixels[4], Color::DMG_SHADES[3]);
    assert_eq!(pixels[5], Color::DMG_SHADES[0]);
}
