/// Porter-Duff and separable/non-separable blend modes, in Skia order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BlendMode {
    Clear,
    Src,
    Dst,
    #[default]
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcATop,
    DstATop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub const ALL: [BlendMode; 29] = [
        BlendMode::Clear,
        BlendMode::Src,
        BlendMode::Dst,
        BlendMode::SrcOver,
        BlendMode::DstOver,
        BlendMode::SrcIn,
        BlendMode::DstIn,
        BlendMode::SrcOut,
        BlendMode::DstOut,
        BlendMode::SrcATop,
        BlendMode::DstATop,
        BlendMode::Xor,
        BlendMode::Plus,
        BlendMode::Modulate,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Multiply,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
    ];

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// True when drawing a transparent-black source leaves the destination
    /// untouched.
    ///
    /// With `Sa = 0` and `S = 0`, every mode whose result reduces to `D`
    /// qualifies. `Clear` and `Src` replace the destination, `SrcIn`,
    /// `DstIn`, `SrcOut`, `DstATop` and `Modulate` multiply it by `Sa`, so
    /// those clear any pixel they touch.
    pub const fn nops_on_transparent_source(self) -> bool {
        !matches!(
            self,
            BlendMode::Clear
                | BlendMode::Src
                | BlendMode::SrcIn
                | BlendMode::DstIn
                | BlendMode::SrcOut
                | BlendMode::DstATop
                | BlendMode::Modulate
        )
    }

    /// True when, over a transparent-black destination, the mode produces
    /// the source color; `false` means the destination stays transparent.
    pub const fn writes_source_over_transparent_destination(self) -> bool {
        !matches!(
            self,
            BlendMode::Clear
                | BlendMode::Dst
                | BlendMode::SrcIn
                | BlendMode::DstIn
                | BlendMode::DstOut
                | BlendMode::SrcATop
                | BlendMode::Modulate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_table() {
        for (index, mode) in BlendMode::ALL.iter().enumerate() {
            assert_eq!(*mode as u32, index as u32);
            assert_eq!(BlendMode::from_index(index as u32), Some(*mode));
        }
        assert_eq!(BlendMode::from_index(29), None);
    }

    #[test]
    fn clearing_modes_do_not_nop_on_transparent_source() {
        let clearing: Vec<BlendMode> = BlendMode::ALL
            .iter()
            .copied()
            .filter(|mode| !mode.nops_on_transparent_source())
            .collect();
        assert_eq!(
            clearing,
            vec![
                BlendMode::Clear,
                BlendMode::Src,
                BlendMode::SrcIn,
                BlendMode::DstIn,
                BlendMode::SrcOut,
                BlendMode::DstATop,
                BlendMode::Modulate,
            ]
        );
        assert!(BlendMode::SrcOver.nops_on_transparent_source());
        assert!(BlendMode::Multiply.nops_on_transparent_source());
    }
}
