//! Enumerated field values shared by device functions and telemetry

wire_enum! {
    /// CAN bus bitrate as encoded in the device CAN settings frame
    pub enum CanBitRate {
        #[serde(rename = "1000k")]
        Kbps1000 = 0,
        #[default]
        #[serde(rename = "500k")]
        Kbps500 = 1,
        #[serde(rename = "250k")]
        Kbps250 = 2,
        #[serde(rename = "125k")]
        Kbps125 = 3,
    }
}

impl CanBitRate {
    /// Bits per second
    pub fn bits_per_second(self) -> u32 {
        match self {
            CanBitRate::Kbps1000 => 1_000_000,
            CanBitRate::Kbps500 => 500_000,
            CanBitRate::Kbps250 => 250_000,
            CanBitRate::Kbps125 => 125_000,
        }
    }
}

wire_enum! {
    /// Operating state reported by the device itself
    pub enum DeviceState {
        #[default]
        PowerOn = 0,
        Starting = 1,
        Run = 2,
        Overtemp = 3,
        Error = 4,
        Sleep = 5,
        Wake = 6,
    }
}

wire_enum! {
    /// Output channel state
    pub enum OutState {
        #[default]
        Off = 0,
        On = 1,
        Overcurrent = 2,
        Fault = 3,
    }
}

wire_enum! {
    /// Momentary inputs follow their source, latching inputs toggle
    pub enum InputMode {
        #[default]
        Momentary = 0,
        Latching = 1,
    }
}

wire_enum! {
    /// Digital input pull resistor
    pub enum InputPull {
        #[default]
        NoPull = 0,
        PullUp = 1,
        PullDown = 2,
    }
}

wire_enum! {
    /// Comparison applied by CAN inputs and conditions
    pub enum Operator {
        #[default]
        Equal = 0,
        NotEqual = 1,
        GreaterThan = 2,
        LessThan = 3,
        GreaterOrEqual = 4,
        LessOrEqual = 5,
        BitwiseAnd = 6,
        BitwiseNand = 7,
    }
}

wire_enum! {
    /// Combination of virtual-input terms
    pub enum BoolOperator {
        #[default]
        And = 0,
        Or = 1,
        Nor = 2,
    }
}

wire_enum! {
    /// Output behaviour after an overcurrent trip
    pub enum ResetMode {
        #[default]
        None = 0,
        Count = 1,
        Endless = 2,
    }
}

wire_enum! {
    /// Edge that triggers a counter action
    pub enum InputEdge {
        #[default]
        Rising = 0,
        Falling = 1,
        Both = 2,
    }
}

wire_enum! {
    /// How the wiper reads its speed demand
    pub enum WiperMode {
        #[default]
        DigIn = 0,
        IntIn = 1,
        MixIn = 2,
    }
}

wire_enum! {
    /// Wiper speed selection
    pub enum WiperSpeed {
        #[default]
        Park = 0,
        Slow = 1,
        Fast = 2,
        Intermittent1 = 3,
        Intermittent2 = 4,
        Intermittent3 = 5,
        Intermittent4 = 6,
        Intermittent5 = 7,
        Intermittent6 = 8,
    }
}

wire_enum! {
    /// Wiper state machine position
    pub enum WiperState {
        #[default]
        Parked = 0,
        Parking = 1,
        SlowOn = 2,
        FastOn = 3,
        IntermittentPause = 4,
        IntermittentOn = 5,
        Wash = 6,
        Swipe = 7,
    }
}

wire_enum! {
    /// Severity of a device log frame
    pub enum LogLevel {
        #[default]
        Info = 1,
        Warning = 2,
        Error = 3,
    }
}
