use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const OPAQUE: u8 = 255;
    pub const TOMBSTONE: u8 = 0;

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self {
            r,
            g,
            b,
            a: Self::OPAQUE,
        }
    }

    pub fn rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }

    #[inline]
    pub fn is_tombstone(self) -> bool {
        self.a == Self::TOMBSTONE
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        PALETTE[rng.gen_range(0..PALETTE.len())]
    }
}

impl From<Rgb> for Rgba {
    fn from(rgb: Rgb) -> Self {
        Self::opaque(rgb.r, rgb.g, rgb.b)
    }
}

pub const PALETTE: [Rgba; 6] = [
    Rgba::opaque(250, 250, 250),
    Rgba::opaque(255, 0, 90),
    Rgba::opaque(94, 8, 255),
    Rgba::opaque(0, 80, 255),
    Rgba::opaque(0, 220, 255),
    Rgba::opaque(255, 255, 14),
];

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn random_color_comes_from_palette() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let color = Rgba::random(&mut rng);
            assert!(PALETTE.contains(&color));
            assert!(!color.is_tombstone());
        }
    }

    #[test]
    fn rgb_promotes_to_opaque() {
        let color = Rgba::from(Rgb::new(1, 2, 3));
        assert_eq!(color, Rgba::opaque(1, 2, 3));
        assert_eq!(color.rgb(), Rgb::new(1, 2, 3));
    }
}
