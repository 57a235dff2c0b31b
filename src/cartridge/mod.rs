pub mod bank_register;
pub mod crt;
pub mod crt_header;
pub mod eeprom;
mod easyflash;
mod epyx;
mod gmod2;
mod magic_desk;
mod ocean;
mod rgcd;
mod simple;
mod zaxxon;

pub use bank_register::{BankRegister, MemoryMode};
use crt::{CrtError, CrtImage};
use crt_header::CrtHeader;
use easyflash::EasyFlash;
use epyx::EpyxFastload;
use gmod2::Gmod2;
use log::{debug, info, trace};
use magic_desk::MagicDesk;
use ocean::Ocean;
use rgcd::Rgcd;
use serde::{Deserialize, Serialize};
use simple::{C64gs, Comal80, Dinamic, Normal, Prophet64, SimonsBasic, WarpSpeed};
use zaxxon::Zaxxon;

use crate::bus::{BusCycleSample, BusWindows, ControlLines};
use crate::consts::*;
use crate::dma::DmaStallController;
use crate::freezer::{ActionReplay, FinalCartridge3, FreezeController, FreezeEvent, FreezeFrame, FreezeState, SuperSnapshot5};
use crate::memory::{BankedMemoryStore, Layout, Window};
use crate::persistence::{eeprom_key, flash_key, PersistError, Persistence};
use crate::reset::ResetPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartridgeVariant {
    Normal,
    ActionReplay,
    FinalCartridge3,
    SimonsBasic,
    Ocean,
    FunPlay,
    AtomicPower,
    EpyxFastload,
    C64gs,
    WarpSpeed,
    Dinamic,
    Zaxxon,
    MagicDesk,
    SuperSnapshot5,
    Comal80,
    EasyFlash,
    Prophet64,
    FreezeFrame,
    FreezeMachine,
    Rgcd,
    Hucky,
    Gmod2,
}

impl CartridgeVariant {
    pub fn from_header(header: &CrtHeader) -> Result<Self, CrtError> {
        Ok(match header.hw_type() {
            0 => CartridgeVariant::Normal,
            1 => CartridgeVariant::ActionReplay,
            3 => CartridgeVariant::FinalCartridge3,
            4 => CartridgeVariant::SimonsBasic,
            5 => CartridgeVariant::Ocean,
            7 => CartridgeVariant::FunPlay,
            9 => CartridgeVariant::AtomicPower,
            10 => CartridgeVariant::EpyxFastload,
            15 => CartridgeVariant::C64gs,
            16 => CartridgeVariant::WarpSpeed,
            17 => CartridgeVariant::Dinamic,
            18 => CartridgeVariant::Zaxxon,
            19 => CartridgeVariant::MagicDesk,
            20 => CartridgeVariant::SuperSnapshot5,
            21 => CartridgeVariant::Comal80,
            32 => CartridgeVariant::EasyFlash,
            43 => CartridgeVariant::Prophet64,
            45 | 77 => CartridgeVariant::FreezeFrame,
            46 => CartridgeVariant::FreezeMachine,
            57 if header.subtype() == 0 => CartridgeVariant::Rgcd,
            57 => CartridgeVariant::Hucky,
            60 => CartridgeVariant::Gmod2,
            t => return Err(CrtError::UnsupportedType(t)),
        })
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        match self {
            CartridgeVariant::ActionReplay
            | CartridgeVariant::AtomicPower
            | CartridgeVariant::Ocean
            | CartridgeVariant::FunPlay
            | CartridgeVariant::C64gs
            | CartridgeVariant::MagicDesk
            | CartridgeVariant::Prophet64
            | CartridgeVariant::Rgcd
            | CartridgeVariant::Hucky
            | CartridgeVariant::Gmod2 => Layout::RomlOnly,
            _ => Layout::Interleaved,
        }
    }

    #[must_use]
    pub fn ram_size(&self) -> usize {
        match self {
            CartridgeVariant::ActionReplay | CartridgeVariant::AtomicPower => ACTION_REPLAY_RAM_SIZE,
            CartridgeVariant::SuperSnapshot5 => SUPER_SNAPSHOT_RAM_SIZE,
            CartridgeVariant::EasyFlash => EASYFLASH_RAM_SIZE,
            _ => 0,
        }
    }

    #[must_use]
    pub fn min_banks(&self) -> usize {
        match self {
            CartridgeVariant::EasyFlash => EASYFLASH_BANKS,
            _ => 1,
        }
    }

    #[must_use]
    pub fn is_freezer(&self) -> bool {
        matches!(
            self,
            CartridgeVariant::ActionReplay
                | CartridgeVariant::AtomicPower
                | CartridgeVariant::FinalCartridge3
                | CartridgeVariant::SuperSnapshot5
                | CartridgeVariant::FreezeFrame
                | CartridgeVariant::FreezeMachine
        )
    }

    #[must_use]
    pub fn reset_policy(&self) -> ResetPolicy {
        match self {
            CartridgeVariant::FreezeFrame | CartridgeVariant::FreezeMachine => ResetPolicy::OnRelease,
            _ => ResetPolicy::WhileHeld,
        }
    }
}

/// State every variant works on: the image, its registers and the output lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartCore {
    store: BankedMemoryStore,
    regs: BankRegister,
    mode: MemoryMode,
    nmi: bool,
    dma: DmaStallController,
    flash_modified: bool,
}

impl CartCore {
    pub fn new(store: BankedMemoryStore) -> Self {
        let dma = DmaStallController::new(store.fits_in_cache());
        Self {
            store,
            regs: BankRegister::new(),
            mode: MemoryMode::Off,
            nmi: false,
            dma,
            flash_modified: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &BankedMemoryStore {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut BankedMemoryStore {
        &mut self.store
    }

    #[inline]
    #[must_use]
    pub fn regs(&self) -> &BankRegister {
        &self.regs
    }

    #[inline]
    pub fn regs_mut(&mut self) -> &mut BankRegister {
        &mut self.regs
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> MemoryMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MemoryMode) {
        if mode != self.mode {
            trace!("mapping {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    #[inline]
    #[must_use]
    pub fn nmi_asserted(&self) -> bool {
        self.nmi
    }

    pub fn set_nmi(&mut self, asserted: bool) {
        self.nmi = asserted;
    }

    #[inline]
    #[must_use]
    pub fn dma(&self) -> &DmaStallController {
        &self.dma
    }

    #[inline]
    pub fn dma_mut(&mut self) -> &mut DmaStallController {
        &mut self.dma
    }

    /// Bank number modulo the banks actually present in the image.
    #[inline]
    #[must_use]
    pub fn wrap_bank(&self, bank: usize) -> usize {
        bank % self.store.banks()
    }

    /// Selects a bank and asks for a stall when it may not be cached.
    pub fn switch_bank(&mut self, bank: usize) {
        if bank != self.regs.bank() {
            debug!("bank {} -> {}", self.regs.bank(), bank);
            self.regs.set_bank(bank);
            self.dma.request(0);
        }
    }

    #[inline]
    #[must_use]
    pub fn read_rom(&self, window: Window, sample: &BusCycleSample) -> u8 {
        self.store.read_cached(window, self.regs.bank(), sample.cache_offset())
    }

    /// ROML/ROMH read of the active bank; the select flag picks the half of
    /// the interleaved pair.
    #[inline]
    #[must_use]
    pub fn read_window(&self, sample: &BusCycleSample) -> Option<u8> {
        if !sample.selects(BusWindows::ROML | BusWindows::ROMH) {
            return None;
        }
        let pair = self.store.read_pair(self.regs.bank(), sample.cache_offset());
        let shift = (sample.selects(BusWindows::ROMH) as u16) << 3;
        Some((pair >> shift) as u8)
    }

    /// ROML byte of `bank` at `page | low address byte`, for variants that
    /// mirror ROM into the I/O windows.
    #[inline]
    #[must_use]
    pub fn read_io_page(&self, bank: usize, page: u16, sample: &BusCycleSample) -> u8 {
        self.store.read(Window::RomL, bank, page | sample.io_address() as u16)
    }

    #[inline]
    #[must_use]
    pub fn flash_modified(&self) -> bool {
        self.flash_modified
    }

    pub fn set_flash_modified(&mut self, modified: bool) {
        self.flash_modified = modified;
    }

    #[must_use]
    pub fn control_lines(&self) -> ControlLines {
        let mut l = self.mode.lines() | ControlLines::NMI | ControlLines::DMA;
        l.set(ControlLines::NMI, !self.nmi);
        l.set(ControlLines::DMA, !self.dma.line_asserted());
        l
    }

    /// Back to power-on register state. The image is left alone.
    fn clear(&mut self) {
        self.regs = BankRegister::new();
        self.mode = MemoryMode::Off;
        self.nmi = false;
        self.dma.clear();
    }
}

pub trait CartridgeI {
    /// Power-on or reset state: bank 0 and the default mapping.
    fn reinit(&mut self, core: &mut CartCore);
    /// CPU half-cycle. Returns the byte to drive on reads that hit the cartridge.
    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8>;
    /// VIC half-cycle, ROMH only and without side effects.
    fn vic_read(&self, core: &CartCore, sample: &BusCycleSample) -> Option<u8> {
        if sample.selects(BusWindows::ROMH) {
            Some(core.read_rom(Window::RomH, sample))
        } else {
            None
        }
    }
    /// The third write after the freeze button: switch to the freezer mapping.
    /// NMI has already been released; a variant may pull it again.
    fn freeze(&mut self, _core: &mut CartCore) {}
    /// Runs before `reinit` when the reset line fires.
    fn on_reset(&mut self, _core: &mut CartCore, _button_held: bool) {}
}

#[derive(Debug, Serialize, Deserialize)]
enum CartType {
    None(),
    Normal(Normal),
    EasyFlash(EasyFlash),
    MagicDesk(MagicDesk),
    Ocean(Ocean),
    Rgcd(Rgcd),
    Epyx(EpyxFastload),
    Gmod2(Gmod2),
    Zaxxon(Zaxxon),
    C64gs(C64gs),
    Dinamic(Dinamic),
    Comal80(Comal80),
    Prophet64(Prophet64),
    SimonsBasic(SimonsBasic),
    WarpSpeed(WarpSpeed),
    FinalCartridge3(FinalCartridge3),
    ActionReplay(ActionReplay),
    SuperSnapshot5(SuperSnapshot5),
    FreezeFrame(FreezeFrame),
}

macro_rules! with_cart {
    ($cart:expr, $c:ident => $body:expr, $none:expr) => {
        match $cart {
            CartType::None() => $none,
            CartType::Normal($c) => $body,
            CartType::EasyFlash($c) => $body,
            CartType::MagicDesk($c) => $body,
            CartType::Ocean($c) => $body,
            CartType::Rgcd($c) => $body,
            CartType::Epyx($c) => $body,
            CartType::Gmod2($c) => $body,
            CartType::Zaxxon($c) => $body,
            CartType::C64gs($c) => $body,
            CartType::Dinamic($c) => $body,
            CartType::Comal80($c) => $body,
            CartType::Prophet64($c) => $body,
            CartType::SimonsBasic($c) => $body,
            CartType::WarpSpeed($c) => $body,
            CartType::FinalCartridge3($c) => $body,
            CartType::ActionReplay($c) => $body,
            CartType::SuperSnapshot5($c) => $body,
            CartType::FreezeFrame($c) => $body,
        }
    };
}

impl CartType {
    fn new(variant: CartridgeVariant, header: &CrtHeader, banks: usize) -> Self {
        match variant {
            CartridgeVariant::Normal => CartType::Normal(Normal::new(MemoryMode::from_lines(header.exrom_high(), header.game_high()))),
            CartridgeVariant::EasyFlash => CartType::EasyFlash(EasyFlash::new(false)),
            CartridgeVariant::MagicDesk | CartridgeVariant::FunPlay => CartType::MagicDesk(MagicDesk::new(banks)),
            CartridgeVariant::Ocean => CartType::Ocean(Ocean::new(banks)),
            CartridgeVariant::Rgcd => CartType::Rgcd(Rgcd::new(false)),
            CartridgeVariant::Hucky => CartType::Rgcd(Rgcd::new(true)),
            CartridgeVariant::EpyxFastload => CartType::Epyx(EpyxFastload::new()),
            CartridgeVariant::Gmod2 => CartType::Gmod2(Gmod2::new()),
            CartridgeVariant::Zaxxon => CartType::Zaxxon(Zaxxon::new()),
            CartridgeVariant::C64gs => CartType::C64gs(C64gs::new()),
            CartridgeVariant::Dinamic => CartType::Dinamic(Dinamic::new()),
            CartridgeVariant::Comal80 => CartType::Comal80(Comal80::new()),
            CartridgeVariant::Prophet64 => CartType::Prophet64(Prophet64::new()),
            CartridgeVariant::SimonsBasic => CartType::SimonsBasic(SimonsBasic::new()),
            CartridgeVariant::WarpSpeed => CartType::WarpSpeed(WarpSpeed::new()),
            CartridgeVariant::FinalCartridge3 => CartType::FinalCartridge3(FinalCartridge3::new()),
            CartridgeVariant::ActionReplay => CartType::ActionReplay(ActionReplay::new(false)),
            CartridgeVariant::AtomicPower => CartType::ActionReplay(ActionReplay::new(true)),
            CartridgeVariant::SuperSnapshot5 => CartType::SuperSnapshot5(SuperSnapshot5::new()),
            CartridgeVariant::FreezeFrame => CartType::FreezeFrame(FreezeFrame::new(false)),
            CartridgeVariant::FreezeMachine => CartType::FreezeFrame(FreezeFrame::new(true)),
        }
    }
}

impl CartridgeI for CartType {
    fn reinit(&mut self, core: &mut CartCore) {
        with_cart!(self, c => c.reinit(core), ())
    }

    #[inline]
    fn access(&mut self, core: &mut CartCore, sample: &BusCycleSample) -> Option<u8> {
        with_cart!(self, c => c.access(core, sample), None)
    }

    #[inline]
    fn vic_read(&self, core: &CartCore, sample: &BusCycleSample) -> Option<u8> {
        with_cart!(self, c => c.vic_read(core, sample), None)
    }

    fn freeze(&mut self, core: &mut CartCore) {
        with_cart!(self, c => c.freeze(core), ())
    }

    fn on_reset(&mut self, core: &mut CartCore, button_held: bool) {
        with_cart!(self, c => c.on_reset(core, button_held), ())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Cartridge {
    variant: Option<CartridgeVariant>,
    cart: CartType,
    core: CartCore,
    freezer: Option<FreezeController>,
    name: String,
    md5: String,
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::none()
    }
}

impl Cartridge {
    /// Nothing plugged in: every line released, the bus is never driven.
    pub fn none() -> Self {
        Self {
            variant: None,
            cart: CartType::None(),
            core: CartCore::new(BankedMemoryStore::new(Layout::RomlOnly, 1, 0)),
            freezer: None,
            name: String::new(),
            md5: String::new(),
        }
    }

    pub fn from_crt(image: &CrtImage) -> Result<Self, CrtError> {
        let variant = CartridgeVariant::from_header(image.header())?;
        let store = image.build_store(variant.layout(), variant.min_banks(), variant.ram_size())?;
        let banks = store.banks();
        let mut cart = Self {
            variant: Some(variant),
            cart: CartType::new(variant, image.header(), banks),
            core: CartCore::new(store),
            freezer: variant.is_freezer().then(FreezeController::new),
            name: image.header().name().to_string(),
            md5: image.md5().to_string(),
        };
        cart.reinit();
        info!(
            "{:?} \"{}\": {} banks, {}",
            variant,
            cart.name,
            banks,
            if cart.core.store.fits_in_cache() { "resident" } else { "stalling on bank switches" }
        );
        Ok(cart)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, CrtError> {
        Self::from_crt(&CrtImage::parse(data)?)
    }

    /// CPU half of a cycle.
    #[inline]
    pub fn dispatch(&mut self, sample: &BusCycleSample) -> Option<u8> {
        let out = self.cart.access(&mut self.core, sample);
        if let Some(f) = &mut self.freezer {
            match f.observe(sample) {
                FreezeEvent::Armed => self.core.set_nmi(true),
                FreezeEvent::Frozen => {
                    self.core.set_nmi(false);
                    self.cart.freeze(&mut self.core);
                }
                FreezeEvent::None => (),
            }
        }
        out
    }

    #[inline]
    pub fn vic_read(&self, sample: &BusCycleSample) -> Option<u8> {
        self.cart.vic_read(&self.core, sample)
    }

    pub fn reinit(&mut self) {
        self.core.clear();
        if let Some(f) = &mut self.freezer {
            f.reset();
        }
        self.cart.reinit(&mut self.core);
        debug!("reinit: bank {} {:?}", self.core.regs.bank(), self.core.mode);
    }

    /// The reset line fired.
    pub fn on_reset(&mut self, button_held: bool) {
        self.cart.on_reset(&mut self.core, button_held);
        self.reinit();
    }

    #[inline]
    #[must_use]
    pub fn control_lines(&self) -> ControlLines {
        match self.cart {
            CartType::None() => ControlLines::released(),
            _ => self.core.control_lines(),
        }
    }

    /// Writes dirty EEPROM/flash contents. Returns the number of blobs stored.
    pub fn persist<P: Persistence>(&mut self, p: &P) -> Result<usize, PersistError> {
        let mut stored = 0;
        if let CartType::Gmod2(g) = &mut self.cart {
            if g.eeprom().modified() {
                p.store(&eeprom_key(&self.md5), &g.eeprom().to_bytes())?;
                g.eeprom_mut().clear_modified();
                stored += 1;
            }
        }
        if self.core.flash_modified {
            p.store(&flash_key(&self.md5), self.core.store.image())?;
            self.core.flash_modified = false;
            stored += 1;
        }
        if stored > 0 {
            debug!("persisted {} blob(s) for {}", stored, self.md5);
        }
        Ok(stored)
    }

    /// Loads previously persisted EEPROM/flash contents, if any.
    pub fn restore<P: Persistence>(&mut self, p: &P) -> Result<usize, PersistError> {
        let mut restored = 0;
        if let CartType::Gmod2(g) = &mut self.cart {
            let key = eeprom_key(&self.md5);
            if let Some(bytes) = p.load(&key)? {
                if !g.eeprom_mut().load_bytes(&bytes) {
                    return Err(PersistError::WrongSize {
                        key,
                        expected: GMOD2_EEPROM_BYTES,
                        actual: bytes.len(),
                    });
                }
                restored += 1;
            }
        }
        if let CartType::EasyFlash(_) = self.cart {
            let key = flash_key(&self.md5);
            if let Some(bytes) = p.load(&key)? {
                if !self.core.store.restore_image(&bytes) {
                    return Err(PersistError::WrongSize {
                        key,
                        expected: self.core.store.image().len(),
                        actual: bytes.len(),
                    });
                }
                restored += 1;
            }
        }
        Ok(restored)
    }

    /// Takes the ROM image from `other`, which snapshots do not carry.
    pub fn copy_from(&mut self, other: &Cartridge) {
        self.core.store.copy_from(&other.core.store);
    }

    #[must_use]
    pub fn variant(&self) -> Option<CartridgeVariant> {
        self.variant
    }

    #[must_use]
    pub fn core(&self) -> &CartCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CartCore {
        &mut self.core
    }

    #[must_use]
    pub fn freeze_state(&self) -> Option<FreezeState> {
        self.freezer.as_ref().map(|f| f.state())
    }

    #[must_use]
    pub fn reset_policy(&self) -> ResetPolicy {
        self.variant.map(|v| v.reset_policy()).unwrap_or(ResetPolicy::WhileHeld)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn md5(&self) -> &str {
        &self.md5
    }

    #[must_use]
    pub fn healthy(&self) -> bool {
        self.variant.is_some()
    }
}
