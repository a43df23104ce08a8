use crate::{
    memory::{DIV, Interrupt, TAC, TIMA, TMA},
    mmu::Mmu,
};

/// Ticks (T-cycles) per DIV increment.
const DIV_PERIOD: u32 = 256;

/// DIV/TIMA counters. Only the sub-increment accumulators live here; the
/// register values themselves are read and written through the bus so they
/// can never drift from what the CPU sees.
#[derive(Debug, Default)]
pub struct Timer {
    div_clock: u32,
    tima_clock: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div_clock: 0,
            tima_clock: 0,
        }
    }

    /// Ticks per TIMA increment for a TAC value.
    pub fn tima_period(tac: u8) -> u32 {
        match tac & 0x03 {
            0b00 => 1024,
            0b01 => 16,
            0b10 => 64,
            _ => 256,
        }
    }

    /// Advance both counters by `cycles` CPU cycles. An overflow reloads
    /// TIMA from TMA and requests the timer interrupt within this call.
    pub fn update(&mut self, cycles: u32, mmu: &mut Mmu) {
        let ticks = cycles * 4;

        self.div_clock += ticks;
        while self.div_clock >= DIV_PERIOD {
            self.div_clock -= DIV_PERIOD;
            let div = mmu.read_register(DIV).wrapping_add(1);
            mmu.write_register(DIV, div);
        }

        let tac = mmu.read_register(TAC);
        if tac & 0x04 == 0 {
            self.tima_clock = 0;
            return;
        }

        let period = Self::tima_period(tac);
        self.tima_clock += ticks;
        while self.tima_clock >= period {
            self.tima_clock -= period;
            let tima = mmu.read_register(TIMA);
            if tima == 0xFF {
                let tma = mmu.read_register(TMA);
                mmu.write_register(TIMA, tma);
                mmu.request_interrupt(Interrupt::Timer);
            } else {
                mmu.write_register(TIMA, tima + 1);
            }
        }
    }
}
