/// Destination rectangle inside a surface's client area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Largest rectangle with the source aspect ratio that fits the client
/// area, centered. The remainder of the client area is letterbox.
pub fn letterbox(src_width: u32, src_height: u32, client_width: u32, client_height: u32) -> Rect {
    if src_width == 0 || src_height == 0 || client_width == 0 || client_height == 0 {
        return Rect::default();
    }

    let (sw, sh) = (src_width as u64, src_height as u64);
    let (cw, ch) = (client_width as u64, client_height as u64);

    let (width, height) = if sw * ch > sh * cw {
        // source is wider than the client area: bars top and bottom
        (cw, (sh * cw / sw).max(1))
    } else {
        // source is taller (or equal): bars left and right
        ((sw * ch / sh).max(1), ch)
    };

    Rect {
        x: ((cw - width) / 2) as u32,
        y: ((ch - height) / 2) as u32,
        width: width as u32,
        height: height as u32,
    }
}
