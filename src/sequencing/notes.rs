/*
Note Names
==========

Note layers carry pitches written as names: `c2`, `g#1`, `eb4`, or plain
MIDI numbers like `60`. Names are converted to MIDI note numbers so the
backend can work with a single pitch representation.

Middle C (c4) = MIDI note 60, which is the standard reference point.

The MIDI formula: note_number = 12 * (octave + 1) + semitone
Where semitone: C=0, C#=1, D=2, D#=3, E=4, F=5, F#=6, G=7, G#=8, A=9, A#=10, B=11

Accidentals:
- Sharps: `#` or `s` (c#4, cs4)
- Flats: `b` (db4)
Octave defaults to 3 when omitted (`c` = c3 = 48).
*/

/// Middle C
pub const MIDDLE_C: f64 = 60.0;

/// Octave used when a note name has none
pub const DEFAULT_OCTAVE: i32 = 3;

/// Octaves a note name may carry, c-1 (MIDI 0) up to b9
pub const OCTAVES: std::ops::RangeInclusive<i32> = -1..=9;

fn semitone(letter: char) -> Option<i32> {
    match letter.to_ascii_lowercase() {
        'c' => Some(0),
        'd' => Some(2),
        'e' => Some(4),
        'f' => Some(5),
        'g' => Some(7),
        'a' => Some(9),
        'b' => Some(11),
        _ => None,
    }
}

/// Convert a note token to a MIDI note number.
///
/// Accepts note names (`c2`, `g#1`, `eb4`, `f`) and numbers (`60`, `61.5`).
pub fn note_to_midi(token: &str) -> Option<f64> {
    if let Ok(n) = token.parse::<f64>() {
        return n.is_finite().then_some(n);
    }

    let mut chars = token.chars().peekable();
    let base = semitone(chars.next()?)?;

    let mut offset = 0i32;
    while let Some(&c) = chars.peek() {
        match c {
            '#' | 's' => offset = offset.checked_add(1)?,
            'b' => offset = offset.checked_sub(1)?,
            _ => break,
        }
        chars.next();
    }

    let rest: String = chars.collect();
    let octave = if rest.is_empty() {
        DEFAULT_OCTAVE
    } else {
        rest.parse::<i32>().ok()?
    };
    if !OCTAVES.contains(&octave) {
        return None;
    }

    Some((12 * (octave + 1) + base + offset) as f64)
}

/// Frequency in Hz of a (possibly fractional) MIDI note, A4 = 440 Hz
pub fn midi_to_freq(note: f64) -> f64 {
    440.0 * 2f64.powf((note - 69.0) / 12.0)
}
