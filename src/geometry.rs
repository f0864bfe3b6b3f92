//! Corner-pin geometry.
//!
//! Four per-corner offsets displace the texture coordinates sampled at the
//! corners of a fixed two-triangle quad. The quad itself is placed on the
//! surface by the [`ViewTransform`] (contain-fit, scale about centre, pan).

/// One of the four corners of the viewport rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Self; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];

    /// Texture coordinate sampled at this corner when its offset is zero.
    /// Origin is the top-left of the source frame.
    pub const fn default_uv(self) -> [f32; 2] {
        match self {
            Self::TopLeft => [0.0, 0.0],
            Self::TopRight => [1.0, 0.0],
            Self::BottomLeft => [0.0, 1.0],
            Self::BottomRight => [1.0, 1.0],
        }
    }

    /// Short key used in the persisted record.
    pub const fn key(self) -> &'static str {
        match self {
            Self::TopLeft => "TL",
            Self::TopRight => "TR",
            Self::BottomLeft => "BL",
            Self::BottomRight => "BR",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::TopLeft => 0,
            Self::TopRight => 1,
            Self::BottomLeft => 2,
            Self::BottomRight => 3,
        }
    }
}

/// Displacement of a corner's sample position, in fractions of the clip's
/// width (`dx`) and height (`dy`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CornerOffset {
    pub dx: f32,
    pub dy: f32,
}

impl CornerOffset {
    pub const fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }
}

/// Offsets for all four corners. Always fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CornerOffsetSet([CornerOffset; 4]);

impl CornerOffsetSet {
    pub fn get(&self, corner: Corner) -> CornerOffset {
        self.0[corner.index()]
    }

    pub fn get_mut(&mut self, corner: Corner) -> &mut CornerOffset {
        &mut self.0[corner.index()]
    }

    pub fn set(&mut self, corner: Corner, offset: CornerOffset) {
        self.0[corner.index()] = offset;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Corner, CornerOffset)> + '_ {
        Corner::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

/// Placement of the viewport on the display surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    /// Pan in display pixels; positive moves right.
    pub x: f32,
    /// Pan in display pixels; positive moves down.
    pub y: f32,
    /// Horizontal flip applied at sample time.
    pub mirrored: bool,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            x: 0.0,
            y: 0.0,
            mirrored: false,
        }
    }
}

/// Effective texture coordinate for one corner: `default - offset`, unclamped.
pub fn corner_uv(offsets: &CornerOffsetSet, corner: Corner) -> [f32; 2] {
    let [u, v] = corner.default_uv();
    let off = offsets.get(corner);
    [u - off.dx, v - off.dy]
}

/// Effective texture coordinates in [`Corner::ALL`] order.
pub fn corner_uvs(offsets: &CornerOffsetSet) -> [[f32; 2]; 4] {
    Corner::ALL.map(|c| corner_uv(offsets, c))
}

/// Final coordinate used for the colour lookup, or `None` when the pixel is
/// outside the source frame and must render black.
pub fn sample_uv(uv: [f32; 2], mirrored: bool) -> Option<[f32; 2]> {
    let u = if mirrored { 1.0 - uv[0] } else { uv[0] };
    let v = uv[1];
    if (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v) {
        Some([u, v])
    } else {
        None
    }
}

/// Converts a step in clip pixels to normalized units. `None` until the clip
/// dimension is known.
#[allow(clippy::cast_precision_loss)]
pub fn normalized_step(pixel_step: f32, clip_dim: u32) -> Option<f32> {
    (clip_dim > 0).then(|| pixel_step / clip_dim as f32)
}

/// Axis-aligned rectangle in surface pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    /// Pixel position of a normalized point inside the rectangle.
    pub fn point(&self, nx: f32, ny: f32) -> [f32; 2] {
        [self.x + nx * self.w, self.y + ny * self.h]
    }
}

/// Where the viewport lands on a `surface` of the given size: the clip is
/// contain-fitted, scaled about the surface centre, then panned.
#[allow(clippy::cast_precision_loss)]
pub fn viewport_rect(surface: (u32, u32), clip: (u32, u32), view: &ViewTransform) -> Rect {
    let sw = surface.0.max(1) as f32;
    let sh = surface.1.max(1) as f32;
    let (fw, fh) = if clip.0 == 0 || clip.1 == 0 {
        (sw, sh)
    } else {
        let cw = clip.0 as f32;
        let ch = clip.1 as f32;
        let fit = (sw / cw).min(sh / ch);
        (cw * fit, ch * fit)
    };
    let w = fw * view.scale;
    let h = fh * view.scale;
    Rect {
        x: (sw - w) * 0.5 + view.x,
        y: (sh - h) * 0.5 + view.y,
        w,
        h,
    }
}

/// Where the selected-corner indicator is drawn, in surface pixels.
pub fn indicator_position(rect: &Rect, offsets: &CornerOffsetSet, corner: Corner) -> [f32; 2] {
    let [u, v] = corner.default_uv();
    let off = offsets.get(corner);
    rect.point(u + off.dx, v + off.dy)
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

/// Corner feeding each of the six quad vertices: (BL, BR, TL), (TL, BR, TR).
pub const TRIANGLE_CORNERS: [Corner; 6] = [
    Corner::BottomLeft,
    Corner::BottomRight,
    Corner::TopLeft,
    Corner::TopLeft,
    Corner::BottomRight,
    Corner::TopRight,
];

/// The six vertices of the mapping quad, positioned over `rect` in NDC.
#[allow(clippy::cast_precision_loss)]
pub fn quad_vertices(offsets: &CornerOffsetSet, rect: &Rect, surface: (u32, u32)) -> [Vertex; 6] {
    let sw = surface.0.max(1) as f32;
    let sh = surface.1.max(1) as f32;
    TRIANGLE_CORNERS.map(|corner| {
        let [nx, ny] = corner.default_uv();
        let [px, py] = rect.point(nx, ny);
        Vertex {
            pos: [px / sw * 2.0 - 1.0, 1.0 - py / sh * 2.0],
            uv: corner_uv(offsets, corner),
        }
    })
}
