// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sync pattern table.
//!
//! Patterns are literal dibit strings with the wire mapping
//! `+1 -> 0, +3 -> 1, -1 -> 2, -3 -> 3`, most significant symbol first.
//! Inverted-polarity reception is handled by the scanner (dibit XOR 2), so
//! only direct patterns are tabled; DMR additionally defines explicit
//! inverted base/mobile sync words which keep their own entries for
//! synctype identity.

use super::{Modulation, Protocol};

/// Latched sync identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncType {
    DmrBsVoice,
    DmrBsData,
    DmrMsVoice,
    DmrMsData,
    DmrBsVoiceInv,
    DmrBsDataInv,
    DmrMsVoiceInv,
    DmrMsDataInv,
    DmrTs1Voice,
    DmrTs1Data,
    DmrTs2Voice,
    DmrTs2Data,
    P25p1,
    P25p2,
    NxdnFsw,
    NxdnPreamble,
    Dpmr1,
    Dpmr2,
    Dpmr3,
    Dpmr4,
    DstarHd,
    DstarSync,
    Ysf,
    EdacsDotting,
    Edacs,
    ProVoice,
    ProVoiceEa,
    M17Lsf,
    M17Str,
    M17Brt,
    M17Pkt,
    M17Pre,
    M17Piv,
}

impl SyncType {
    /// Protocol family this sync belongs to.
    pub fn protocol(self) -> Protocol {
        use SyncType::*;
        match self {
            DmrBsVoice | DmrBsData | DmrMsVoice | DmrMsData | DmrBsVoiceInv | DmrBsDataInv
            | DmrMsVoiceInv | DmrMsDataInv | DmrTs1Voice | DmrTs1Data | DmrTs2Voice
            | DmrTs2Data => Protocol::Dmr,
            P25p1 => Protocol::P25Phase1,
            P25p2 => Protocol::P25Phase2,
            NxdnFsw | NxdnPreamble => Protocol::Nxdn,
            Dpmr1 | Dpmr2 | Dpmr3 | Dpmr4 => Protocol::Dpmr,
            DstarHd | DstarSync => Protocol::DStar,
            Ysf => Protocol::Ysf,
            EdacsDotting | Edacs => Protocol::Edacs,
            ProVoice | ProVoiceEa => Protocol::ProVoice,
            M17Lsf | M17Str | M17Brt | M17Pkt | M17Pre | M17Piv => Protocol::M17,
        }
    }

    /// True when the sync is a voice-bearing frame sync (as opposed to a
    /// preamble or dotting pattern).
    pub fn is_voice_sync(self) -> bool {
        use SyncType::*;
        matches!(
            self,
            DmrBsVoice | DmrMsVoice | DmrBsVoiceInv | DmrMsVoiceInv | DmrTs1Voice | DmrTs2Voice
        )
    }

    /// Preambles and dotting sequences hint at a protocol but carry no
    /// frame alignment; the dispatcher does not commit to a handler on
    /// them. The alternating outer-symbol patterns (NXDN preamble, EDACS
    /// dotting, M17 preamble) are mutually indistinguishable by design.
    pub fn is_preamble(self) -> bool {
        use SyncType::*;
        matches!(self, NxdnPreamble | EdacsDotting | M17Pre | M17Piv)
    }

    /// The synctype reported when this pattern matches with inverted
    /// polarity. DMR keeps distinct +/- identities; other protocols report
    /// the direct identity and let the slicer flip.
    pub fn inverted_variant(self) -> SyncType {
        use SyncType::*;
        match self {
            DmrBsVoice => DmrBsVoiceInv,
            DmrBsData => DmrBsDataInv,
            DmrMsVoice => DmrMsVoiceInv,
            DmrMsData => DmrMsDataInv,
            other => other,
        }
    }
}

/// One pattern table entry.
pub struct SyncPattern {
    pub synctype: SyncType,
    /// Dibit digits '0'..'3', most significant symbol first.
    pub dibits: &'static str,
    pub modulation: Modulation,
    /// Maximum dibit mismatches accepted by the scanner.
    pub max_errs: u8,
}

const fn pat(
    synctype: SyncType,
    dibits: &'static str,
    modulation: Modulation,
    max_errs: u8,
) -> SyncPattern {
    SyncPattern {
        synctype,
        dibits,
        modulation,
        max_errs,
    }
}

/// Full table, scanned in order. More specific (longer) patterns first so a
/// preamble never shadows a frame sync at equal distance.
pub static PATTERNS: &[SyncPattern] = &[
    // DMR base/mobile and direct-mode TDMA sync words
    pat(SyncType::DmrBsVoice, "131111333113313313113313", Modulation::C4fm, 2),
    pat(SyncType::DmrBsData, "313333111331131131331131", Modulation::C4fm, 2),
    pat(SyncType::DmrMsVoice, "133313311131311113313331", Modulation::C4fm, 2),
    pat(SyncType::DmrMsData, "311131133313133331131113", Modulation::C4fm, 2),
    pat(SyncType::DmrTs1Voice, "113111131333131311133333", Modulation::C4fm, 2),
    pat(SyncType::DmrTs1Data, "331333313111313133311111", Modulation::C4fm, 2),
    pat(SyncType::DmrTs2Voice, "133133333111331111311133", Modulation::C4fm, 2),
    pat(SyncType::DmrTs2Data, "311311111333113333133311", Modulation::C4fm, 2),
    // P25
    pat(SyncType::P25p1, "111113113311333313133333", Modulation::C4fm, 2),
    pat(SyncType::P25p2, "11131131111331333111", Modulation::Cqpsk, 2),
    // NXDN frame sync word and preamble
    pat(SyncType::NxdnFsw, "3031331121", Modulation::C4fm, 1),
    pat(SyncType::NxdnPreamble, "1313131313131313", Modulation::C4fm, 0),
    // dPMR frame syncs 1-4
    pat(SyncType::Dpmr1, "11313313113131133131", Modulation::C4fm, 2),
    pat(SyncType::Dpmr2, "13113331131133113313", Modulation::C4fm, 2),
    pat(SyncType::Dpmr3, "31131133311311331131", Modulation::C4fm, 2),
    pat(SyncType::Dpmr4, "33311311133113113313", Modulation::C4fm, 2),
    // D-STAR header and frame sync (GMSK bit patterns as dibit pairs)
    pat(SyncType::DstarHd, "1313131313131311313113", Modulation::Gfsk, 2),
    pat(SyncType::DstarSync, "1313131311313113", Modulation::Gfsk, 1),
    // Yaesu System Fusion
    pat(SyncType::Ysf, "31101301302112031031", Modulation::C4fm, 2),
    // EDACS/ProVoice
    pat(SyncType::Edacs, "131313131313111333111333", Modulation::Gfsk, 2),
    pat(SyncType::EdacsDotting, "13131313131313131313", Modulation::Gfsk, 0),
    pat(SyncType::ProVoice, "131313113113133131113313", Modulation::Gfsk, 2),
    pat(SyncType::ProVoiceEa, "131313113113133131331131", Modulation::Gfsk, 2),
    // M17
    pat(SyncType::M17Lsf, "11113313", Modulation::C4fm, 0),
    pat(SyncType::M17Str, "33331131", Modulation::C4fm, 0),
    pat(SyncType::M17Pkt, "13113333", Modulation::C4fm, 0),
    pat(SyncType::M17Brt, "31331111", Modulation::C4fm, 0),
    pat(SyncType::M17Pre, "13131313", Modulation::C4fm, 0),
    pat(SyncType::M17Piv, "31313131", Modulation::C4fm, 0),
];
