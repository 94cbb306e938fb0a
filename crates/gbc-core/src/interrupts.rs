// Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
const INTERRUPT_VBLANK: u16 = 0x40;
const INTERRUPT_STAT: u16 = 0x48;
const INTERRUPT_TIMER: u16 = 0x50;
const INTERRUPT_SERIAL: u16 = 0x58;
const INTERRUPT_JOYPAD: u16 = 0x60;

const INTERRUPT_MASK: u8 = 0x1F;

/// Interrupt sources in priority order (lowest bit wins).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Stat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    #[inline]
    pub const fn bit(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::Stat => 0x02,
            Interrupt::Timer => 0x04,
            Interrupt::Serial => 0x08,
            Interrupt::Joypad => 0x10,
        }
    }

    #[inline]
    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => INTERRUPT_VBLANK,
            Interrupt::Stat => INTERRUPT_STAT,
            Interrupt::Timer => INTERRUPT_TIMER,
            Interrupt::Serial => INTERRUPT_SERIAL,
            Interrupt::Joypad => INTERRUPT_JOYPAD,
        }
    }

    /// Highest-priority interrupt present in `pending`.
    fn highest(pending: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|i| pending & i.bit() != 0)
    }
}

/// What the CPU does on its next step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecState {
    #[default]
    Running,
    /// Waiting for `IE & IF != 0`.
    Halted,
    /// HALT was executed with IME=0 and an interrupt already pending: the
    /// next opcode fetch does not advance PC.
    HaltBug,
    /// Low-power STOP; left when a joypad interrupt is requested.
    Stopped,
}

#[derive(Clone, Debug, Default)]
pub struct InterruptController {
    ime: bool,
    /// Counts down to the IME flip after EI: 2 when EI executes, 1 while
    /// the following instruction runs.
    ime_enable_delay: u8,
    ie: u8,
    flags: u8,
    state: ExecState,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post-boot state: IF has VBlank latched (Pan Docs power-up table).
    pub fn new_post_boot() -> Self {
        Self {
            flags: 0x01,
            ..Self::default()
        }
    }

    #[inline]
    pub fn ime(&self) -> bool {
        self.ime
    }

    pub fn ie(&self) -> u8 {
        self.ie
    }

    pub fn set_ie(&mut self, val: u8) {
        self.ie = val;
    }

    /// IF as seen through the bus; the unused upper bits read as 1.
    pub fn read_if(&self) -> u8 {
        self.flags | !INTERRUPT_MASK
    }

    /// Software write to IF.
    pub fn write_if(&mut self, val: u8) {
        self.flags = val & INTERRUPT_MASK;
    }

    #[inline]
    pub fn request(&mut self, interrupt: Interrupt) {
        self.flags |= interrupt.bit();
    }

    #[inline]
    pub fn acknowledge(&mut self, interrupt: Interrupt) {
        self.flags &= !interrupt.bit();
    }

    pub fn is_requested(&self, interrupt: Interrupt) -> bool {
        self.flags & interrupt.bit() != 0
    }

    /// Requested and enabled interrupts, regardless of IME.
    #[inline]
    pub fn pending(&self) -> u8 {
        self.ie & self.flags & INTERRUPT_MASK
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn set_state(&mut self, state: ExecState) {
        self.state = state;
    }

    /// EI: IME turns on once the instruction after EI has completed. A second
    /// EI in that window does not push the deadline back.
    pub fn schedule_enable(&mut self) {
        if self.ime_enable_delay == 0 {
            self.ime_enable_delay = 2;
        }
    }

    /// DI and interrupt dispatch: immediate, and cancels a pending EI.
    pub fn disable(&mut self) {
        self.ime = false;
        self.ime_enable_delay = 0;
    }

    /// RETI: immediate.
    pub fn enable_now(&mut self) {
        self.ime = true;
        self.ime_enable_delay = 0;
    }

    pub fn enable_pending(&self) -> bool {
        self.ime_enable_delay > 0
    }

    /// Called once at the end of every executed instruction.
    pub fn end_instruction(&mut self) {
        match self.ime_enable_delay {
            0 => {}
            1 => {
                self.ime = true;
                self.ime_enable_delay = 0;
            }
            _ => self.ime_enable_delay -= 1,
        }
    }

    /// Highest-priority interrupt that would be dispatched right now.
    pub fn next(&self) -> Option<Interrupt> {
        if !self.ime {
            return None;
        }
        Interrupt::highest(self.pending())
    }

    /// Begin dispatching the highest-priority pending interrupt: clears its
    /// IF bit and IME. Returns the interrupt so the CPU can push PC and jump.
    pub fn take_next(&mut self) -> Option<Interrupt> {
        let interrupt = self.next()?;
        self.acknowledge(interrupt);
        self.disable();
        Some(interrupt)
    }
}
