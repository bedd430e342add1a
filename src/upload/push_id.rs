use parking_lot::Mutex;
use uuid::Uuid;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

// uuid v4 bytes that carry no version or variant bits
const RANDOM_BYTES: [usize; 12] = [0, 1, 2, 3, 4, 5, 7, 9, 10, 11, 12, 13];

/// Generates realtime-database push keys.
///
/// Keys are 20 characters: 8 encode the creation time in milliseconds, 12 are
/// random. Keys created in the same millisecond increment the random part so
/// lexicographic order always follows creation order.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last: Mutex<Option<(i64, [u8; 12])>>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn next_at(&self, millis: i64) -> String {
        let mut last = self.last.lock();

        let random = match *last {
            Some((previous, mut random)) if previous == millis => {
                for digit in random.iter_mut().rev() {
                    if *digit == 63 {
                        *digit = 0;
                    } else {
                        *digit += 1;
                        break;
                    }
                }
                random
            }
            _ => {
                let bytes = Uuid::new_v4().into_bytes();
                let mut random = [0u8; 12];
                for (digit, index) in random.iter_mut().zip(RANDOM_BYTES) {
                    *digit = bytes[index] % 64;
                }
                random
            }
        };
        *last = Some((millis, random));

        let mut key = [0u8; 20];
        let mut time = millis.max(0) as u64;
        for slot in key[..8].iter_mut().rev() {
            *slot = PUSH_CHARS[(time % 64) as usize];
            time /= 64;
        }
        for (slot, digit) in key[8..].iter_mut().zip(random) {
            *slot = PUSH_CHARS[digit as usize];
        }

        key.iter().map(|&c| c as char).collect()
    }
}
