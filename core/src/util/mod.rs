mod ring_lines;

pub use ring_lines::RingLines;
