//! Chronologically sortable child keys for append-style writes.
//!
//! A key is 8 characters of millisecond timestamp followed by 12 random
//! characters, all drawn from an alphabet that sorts in ASCII order. Keys
//! generated within the same millisecond increment the random tail, so keys
//! from one generator always sort in creation order.

use chrono::Utc;
use std::sync::Mutex;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 12;
const TIMESTAMP_LEN: usize = 8;

#[derive(Default)]
struct PushState {
    last_millis: i64,
    last_random: [u8; RANDOM_LEN],
}

#[derive(Default)]
pub struct PushKeyGenerator {
    state: Mutex<PushState>,
}

impl PushKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&self) -> String {
        self.next_key_at(Utc::now().timestamp_millis())
    }

    fn next_key_at(&self, millis: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if millis == state.last_millis {
            increment(&mut state.last_random);
        } else {
            state.last_millis = millis;
            state.last_random = random_digits();
        }

        let mut key = String::with_capacity(TIMESTAMP_LEN + RANDOM_LEN);
        let mut stamp = [0u8; TIMESTAMP_LEN];
        let mut now = millis.max(0);
        for slot in stamp.iter_mut().rev() {
            *slot = PUSH_CHARS[(now % 64) as usize];
            now /= 64;
        }
        key.extend(stamp.iter().map(|&c| c as char));
        key.extend(
            state
                .last_random
                .iter()
                .map(|&digit| PUSH_CHARS[digit as usize] as char),
        );
        key
    }
}

fn random_digits() -> [u8; RANDOM_LEN] {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let mut digits = [0u8; RANDOM_LEN];
    for (digit, byte) in digits.iter_mut().zip(bytes.iter()) {
        *digit = byte % 64;
    }
    digits
}

fn increment(digits: &mut [u8; RANDOM_LEN]) {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_have_fixed_length_and_alphabet() {
        let key = PushKeyGenerator::new().next_key();
        assert_eq!(key.len(), 20);
        assert!(key.bytes().all(|c| PUSH_CHARS.contains(&c)));
    }

    #[test]
    fn keys_in_same_millisecond_sort_in_order() {
        let generator = PushKeyGenerator::new();
        let keys: Vec<String> = (0..200).map(|_| generator.next_key_at(1_700_000_000_000)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn later_timestamps_sort_after_earlier_ones() {
        let generator = PushKeyGenerator::new();
        let early = generator.next_key_at(1_000);
        let late = generator.next_key_at(2_000);
        assert!(early < late);
        assert_eq!(&early[..8], "-------F");
    }

    #[test]
    fn increment_carries() {
        let mut digits = [63u8; RANDOM_LEN];
        digits[0] = 5;
        increment(&mut digits);
        assert_eq!(digits[0], 6);
        assert!(digits[1..].iter().all(|&d| d == 0));
    }
}
