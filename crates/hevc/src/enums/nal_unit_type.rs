use nutype_enum::nutype_enum;

nutype_enum! {
    /// NAL (Network Abstraction Layer) unit types as defined by ISO/IEC 23008-2 Table 7-1.
    pub enum NALUnitType(u8) {
        /// Coded slice segment of a non-TSA, non-STSA trailing picture
        TrailN = 0,
        /// Coded slice segment of a non-TSA, non-STSA trailing picture
        TrailR = 1,
        /// Coded slice segment of a TSA picture
        TsaN = 2,
        /// Coded slice segment of a TSA picture
        TsaR = 3,
        /// Coded slice segment of an STSA picture
        StsaN = 4,
        /// Coded slice segment of an STSA picture
        StsaR = 5,
        /// Coded slice segment of a RADL picture
        RadlN = 6,
        /// Coded slice segment of a RADL picture
        RadlR = 7,
        /// Coded slice segment of a RASL picture
        RaslN = 8,
        /// Coded slice segment of a RASL picture
        RaslR = 9,
        /// Reserved non-IRAP SLNR VCL NAL unit types
        RsvVclN10 = 10,
        /// Reserved non-IRAP sub-layer reference VCL NAL unit types
        RsvVclR11 = 11,
        /// Reserved non-IRAP SLNR VCL NAL unit types
        RsvVclN12 = 12,
        /// Reserved non-IRAP sub-layer reference VCL NAL unit types
        RsvVclR13 = 13,
        /// Reserved non-IRAP SLNR VCL NAL unit types
        RsvVclN14 = 14,
        /// Reserved non-IRAP sub-layer reference VCL NAL unit types
        RsvVclR15 = 15,
        /// Coded slice segment of a BLA picture
        BlaWLp = 16,
        /// Coded slice segment of a BLA picture
        BlaWRadl = 17,
        /// Coded slice segment of a BLA picture
        BlaNLp = 18,
        /// Coded slice segment of an IDR picture
        IdrWRadl = 19,
        /// Coded slice segment of an IDR picture
        IdrNLp = 20,
        /// Coded slice segment of a CRA picture
        CraNut = 21,
        /// Reserved IRAP VCL NAL unit types
        RsvIrapVcl22 = 22,
        /// Reserved IRAP VCL NAL unit types
        RsvIrapVcl23 = 23,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl24 = 24,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl25 = 25,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl26 = 26,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl27 = 27,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl28 = 28,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl29 = 29,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl30 = 30,
        /// Reserved non-IRAP VCL NAL unit types
        RsvVcl31 = 31,
        /// Video parameter set
        VpsNut = 32,
        /// Sequence parameter set
        SpsNut = 33,
        /// Picture parameter set
        PpsNut = 34,
        /// Access unit delimiter
        AudNut = 35,
        /// End of sequence
        EosNut = 36,
        /// End of bitstream
        EobNut = 37,
        /// Filler data
        FdNut = 38,
        /// Supplemental enhancement information
        PrefixSeiNut = 39,
        /// Supplemental enhancement information
        SuffixSeiNut = 40,
        /// Reserved
        RsvNvcl41 = 41,
        /// Reserved
        RsvNvcl42 = 42,
        /// Reserved
        RsvNvcl43 = 43,
        /// Reserved
        RsvNvcl44 = 44,
        /// Reserved
        RsvNvcl45 = 45,
        /// Reserved
        RsvNvcl46 = 46,
        /// Reserved
        RsvNvcl47 = 47,
    }
}

impl NALUnitType {
    /// Returns `true` if the NAL unit type class of this NAL unit type is
    /// VCL (Video Coding Layer).
    pub const fn is_vcl(&self) -> bool {
        self.0 <= 31
    }

    /// Returns `true` for the coded-slice NAL unit types (0-9 and 16-21):
    /// the units that end an access unit when splitting a stream into
    /// per-picture packets.
    pub const fn is_slice(&self) -> bool {
        self.0 <= 9 || (self.0 >= 16 && self.0 <= 21)
    }

    /// Returns `true` for IRAP slice types (BLA/IDR/CRA), which carry the
    /// `no_output_of_prior_pics_flag` in their slice header.
    pub const fn is_irap(&self) -> bool {
        self.0 >= 16 && self.0 <= 23
    }

    /// Returns `true` for IDR slices, whose picture order count is 0 by
    /// definition.
    pub const fn is_idr(&self) -> bool {
        self.0 == 19 || self.0 == 20
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(NALUnitType::TrailN.is_vcl());
        assert!(NALUnitType::CraNut.is_slice());
        assert!(NALUnitType::IdrWRadl.is_idr());
        assert!(NALUnitType::IdrNLp.is_irap());
        assert!(!NALUnitType::VpsNut.is_vcl());
        assert!(!NALUnitType::SuffixSeiNut.is_slice());
        assert!(!NALUnitType::RsvVcl24.is_slice());
        assert!(NALUnitType::RsvVcl24.is_vcl());
    }
}
