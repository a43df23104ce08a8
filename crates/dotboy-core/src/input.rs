/// The eight logical buttons of the handheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];

    /// Bit inside the held mask. Directions take the low nibble, action
    /// buttons the high nibble, both in P1 line order.
    const fn mask(self) -> u8 {
        match self {
            Button::Right => 0x01,
            Button::Left => 0x02,
            Button::Up => 0x04,
            Button::Down => 0x08,
            Button::A => 0x10,
            Button::B => 0x20,
            Button::Select => 0x40,
            Button::Start => 0x80,
        }
    }

    const fn is_direction(self) -> bool {
        self.mask() & 0x0F != 0
    }
}

// P1 select lines are active low.
const SELECT_DIRECTIONS: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

/// Joypad state behind the P1 register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joypad {
    held: u8,
    select: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            held: 0,
            select: SELECT_DIRECTIONS | SELECT_BUTTONS,
        }
    }

    fn group_selected(&self, button: Button) -> bool {
        if button.is_direction() {
            self.select & SELECT_DIRECTIONS == 0
        } else {
            self.select & SELECT_BUTTONS == 0
        }
    }

    /// Current P1 value computed from the select lines and held buttons.
    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & SELECT_DIRECTIONS == 0 {
            low &= !(self.held & 0x0F);
        }
        if self.select & SELECT_BUTTONS == 0 {
            low &= !(self.held >> 4);
        }
        0xC0 | self.select | low
    }

    /// Only the two select lines are writable.
    pub fn write(&mut self, val: u8) {
        self.select = val & (SELECT_DIRECTIONS | SELECT_BUTTONS);
    }

    /// Returns true when the press should raise the joypad interrupt: the
    /// button was up and its group is currently selected.
    pub fn press(&mut self, button: Button) -> bool {
        let newly = self.held & button.mask() == 0;
        self.held |= button.mask();
        newly && self.group_selected(button)
    }

    pub fn release(&mut self, button: Button) {
        self.held &= !button.mask();
    }

    pub fn is_held(&self, button: Button) -> bool {
        self.held & button.mask() != 0
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}
