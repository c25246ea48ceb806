use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;
const MIN_RTO: Duration = Duration::from_millis(50);
const MAX_RTO: Duration = Duration::from_secs(1);
const MAX_BUFFERED_RELIABLE: usize = 4096;

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone)]
struct InFlight {
    sequence: u32,
    send_time: Instant,
    reliable_sequence: Option<u32>,
    acked: bool,
}

#[derive(Debug, Clone)]
pub struct Unacked {
    pub payload: Vec<u8>,
    pub last_sent: Instant,
}

/// Outgoing side of a peer: matches ack bitfields against sent datagrams, keeps
/// reliable payloads until one of their datagrams is acknowledged, and estimates RTT.
#[derive(Debug)]
pub struct AckTracker {
    in_flight: VecDeque<InFlight>,
    max_in_flight: usize,
    unacked: BTreeMap<u32, Unacked>,
    srtt: f32,
    rtt_var: f32,
}

impl AckTracker {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            in_flight: VecDeque::with_capacity(max_in_flight),
            max_in_flight,
            unacked: BTreeMap::new(),
            srtt: 100.0,
            rtt_var: 50.0,
        }
    }

    pub fn track_packet(&mut self, sequence: u32, reliable_sequence: Option<u32>, now: Instant) {
        while self.in_flight.len() >= self.max_in_flight {
            self.in_flight.pop_front();
        }

        self.in_flight.push_back(InFlight {
            sequence,
            send_time: now,
            reliable_sequence,
            acked: false,
        });
    }

    pub fn retain_reliable(&mut self, reliable_sequence: u32, payload: Vec<u8>, now: Instant) {
        self.unacked.insert(
            reliable_sequence,
            Unacked {
                payload,
                last_sent: now,
            },
        );
    }

    /// Marks everything covered by `ack`/`ack_bitfield` and releases the reliable
    /// payloads those datagrams carried. Returns the released reliable sequences.
    pub fn process_ack(&mut self, ack: u32, ack_bitfield: u32, now: Instant) -> Vec<u32> {
        let mut released = Vec::new();
        let mut rtt_samples = Vec::new();

        for sent in &mut self.in_flight {
            if sent.acked {
                continue;
            }

            let is_acked = if sent.sequence == ack {
                true
            } else if sequence_greater_than(ack, sent.sequence) {
                let diff = ack.wrapping_sub(sent.sequence);
                diff <= 32 && (ack_bitfield & (1 << (diff - 1))) != 0
            } else {
                false
            };

            if is_acked {
                sent.acked = true;
                rtt_samples.push(now.duration_since(sent.send_time).as_secs_f32() * 1000.0);
                if let Some(reliable) = sent.reliable_sequence {
                    if self.unacked.remove(&reliable).is_some() {
                        released.push(reliable);
                    }
                }
            }
        }

        for rtt in rtt_samples {
            self.update_rtt(rtt);
        }

        while self.in_flight.front().is_some_and(|p| p.acked) {
            self.in_flight.pop_front();
        }

        released
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn rto(&self) -> Duration {
        Duration::from_secs_f32((self.srtt + 4.0 * self.rtt_var) / 1000.0).clamp(MIN_RTO, MAX_RTO)
    }

    /// Reliable payloads whose last transmission is older than the retransmission
    /// timeout. Their send time is refreshed; the caller resends them.
    pub fn due_resends(&mut self, now: Instant) -> Vec<(u32, Vec<u8>)> {
        let rto = self.rto();
        self.unacked
            .iter_mut()
            .filter(|(_, entry)| now.duration_since(entry.last_sent) >= rto)
            .map(|(&sequence, entry)| {
                entry.last_sent = now;
                (sequence, entry.payload.clone())
            })
            .collect()
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }
}

/// Incoming side of a peer: duplicate filtering and the ack bitfield to echo back.
#[derive(Debug)]
pub struct ReceiveTracker {
    last_received: u32,
    received_bitfield: u32,
    recent_sequences: VecDeque<u32>,
    max_recent: usize,
}

impl Default for ReceiveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self {
            last_received: 0,
            received_bitfield: 0,
            recent_sequences: VecDeque::with_capacity(128),
            max_recent: 128,
        }
    }

    /// `false` for a datagram seen before.
    pub fn record_received(&mut self, sequence: u32) -> bool {
        if self.recent_sequences.contains(&sequence) {
            return false;
        }

        if self.recent_sequences.len() >= self.max_recent {
            self.recent_sequences.pop_front();
        }
        self.recent_sequences.push_back(sequence);

        if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            self.received_bitfield = if diff < 32 {
                (self.received_bitfield << diff) | (1 << (diff - 1))
            } else if diff == 32 {
                1 << 31
            } else {
                0
            };
            if self.last_received == 0 {
                self.received_bitfield = 0;
            }
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= 32 {
                self.received_bitfield |= 1 << (diff - 1);
            }
        }

        true
    }

    pub fn ack_data(&self) -> (u32, u32) {
        (self.last_received, self.received_bitfield)
    }
}

/// Releases reliable payloads strictly in sequence order.
#[derive(Debug)]
pub struct ReliableInbox {
    next_expected: u32,
    buffered: BTreeMap<u32, Vec<u8>>,
}

impl Default for ReliableInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableInbox {
    pub fn new() -> Self {
        Self {
            next_expected: 1,
            buffered: BTreeMap::new(),
        }
    }

    pub fn accept(&mut self, sequence: u32, payload: Vec<u8>) -> Vec<Vec<u8>> {
        if !sequence_greater_than(sequence, self.next_expected.wrapping_sub(1)) {
            return Vec::new();
        }

        if self.buffered.len() < MAX_BUFFERED_RELIABLE || sequence == self.next_expected {
            self.buffered.entry(sequence).or_insert(payload);
        }

        let mut ready = Vec::new();
        while let Some(payload) = self.buffered.remove(&self.next_expected) {
            ready.push(payload);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
        ready
    }

    pub fn pending(&self) -> usize {
        self.buffered.len()
    }
}
