use std::time::{Duration, Instant};

use readalong_core::{PlaybackTransport, Sentence, SentenceId};
use tracing::debug;

/// Stand-in for a speech engine: dwells on each sentence for as long as it
/// would take to read at `words_per_minute`, never less than `min_dwell`.
#[derive(Debug)]
pub struct ReadingClock {
    schedule: Vec<(SentenceId, Duration)>,
    position: Option<usize>,
    /// Time already spent on the current sentence before `since`.
    carried: Duration,
    since: Option<Instant>,
    playing: bool,
}

impl ReadingClock {
    pub fn new(sentences: &[Sentence], words_per_minute: f32, min_dwell: Duration) -> Self {
        let schedule = sentences
            .iter()
            .map(|sentence| (sentence.id, dwell_for(&sentence.text, words_per_minute, min_dwell)))
            .collect();
        Self {
            schedule,
            position: None,
            carried: Duration::ZERO,
            since: None,
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Starts from the current sentence, or from the top when nothing is
    /// active.
    pub fn play(&mut self, now: Instant) {
        if self.schedule.is_empty() {
            return;
        }
        if self.position.is_none() {
            self.position = Some(0);
            self.carried = Duration::ZERO;
        }
        self.playing = true;
        self.since = Some(now);
    }

    pub fn pause(&mut self, now: Instant) {
        if !self.playing {
            return;
        }
        self.advance(now);
        self.playing = false;
        self.since = None;
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.playing {
            self.pause(now);
        } else {
            self.play(now);
        }
        debug!(playing = self.playing, "playback toggled");
    }

    fn advance(&mut self, now: Instant) {
        let Some(since) = self.since else {
            self.since = Some(now);
            return;
        };
        let mut elapsed = self.carried + now.saturating_duration_since(since);
        while let Some(idx) = self.position {
            let dwell = self.schedule[idx].1;
            if elapsed < dwell {
                break;
            }
            elapsed -= dwell;
            if idx + 1 < self.schedule.len() {
                self.position = Some(idx + 1);
            } else {
                debug!("reached the end of the document");
                self.position = None;
                self.playing = false;
                elapsed = Duration::ZERO;
            }
        }
        self.carried = elapsed;
        self.since = self.playing.then_some(now);
    }
}

impl PlaybackTransport for ReadingClock {
    fn jump_to(&mut self, sentence: SentenceId) {
        match self.schedule.iter().position(|(id, _)| *id == sentence) {
            Some(idx) => {
                self.position = Some(idx);
                self.carried = Duration::ZERO;
                self.since = None;
            }
            None => debug!(sentence, "jump target not scheduled"),
        }
    }

    fn poll_active(&mut self, now: Instant) -> Option<SentenceId> {
        if self.playing {
            self.advance(now);
        }
        self.position.map(|idx| self.schedule[idx].0)
    }
}

fn dwell_for(text: &str, words_per_minute: f32, min_dwell: Duration) -> Duration {
    let words = text.split_whitespace().count().max(1) as f32;
    let seconds = words * 60.0 / words_per_minute.max(1.0);
    Duration::from_secs_f32(seconds).max(min_dwell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> ReadingClock {
        // 60 wpm: one second per word.
        ReadingClock::new(
            &[
                Sentence::new(1, "one two", Vec::new()),
                Sentence::new(2, "three", Vec::new()),
                Sentence::new(3, "four five six", Vec::new()),
            ],
            60.0,
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn dwell_respects_minimum() {
        let clock = clock();
        let dwells: Vec<_> = clock.schedule.iter().map(|(_, d)| d.as_millis()).collect();
        assert_eq!(dwells, vec![2000, 1500, 3000]);
    }

    #[test]
    fn advances_through_sentences_while_playing() {
        let start = Instant::now();
        let mut clock = clock();
        assert_eq!(clock.poll_active(start), None);

        clock.play(start);
        assert_eq!(clock.poll_active(start), Some(1));
        assert_eq!(clock.poll_active(start + Duration::from_millis(2100)), Some(2));
        assert_eq!(clock.poll_active(start + Duration::from_millis(3600)), Some(3));
        assert_eq!(clock.poll_active(start + Duration::from_secs(10)), None);
        assert!(!clock.is_playing());
    }

    #[test]
    fn pause_holds_position_and_elapsed_time() {
        let start = Instant::now();
        let mut clock = clock();
        clock.play(start);
        clock.toggle(start + Duration::from_millis(1500));
        assert!(!clock.is_playing());
        assert_eq!(clock.poll_active(start + Duration::from_secs(30)), Some(1));

        let resumed = start + Duration::from_secs(40);
        clock.toggle(resumed);
        assert_eq!(clock.poll_active(resumed + Duration::from_millis(400)), Some(1));
        assert_eq!(clock.poll_active(resumed + Duration::from_millis(600)), Some(2));
    }

    #[test]
    fn jump_restarts_dwell_on_target() {
        let start = Instant::now();
        let mut clock = clock();
        clock.play(start);
        clock.poll_active(start + Duration::from_millis(1900));
        clock.jump_to(3);
        let after = start + Duration::from_secs(2);
        assert_eq!(clock.poll_active(after), Some(3));
        assert_eq!(clock.poll_active(after + Duration::from_millis(2900)), Some(3));

        clock.jump_to(99);
        assert_eq!(clock.poll_active(after + Duration::from_millis(2950)), Some(3));
    }

    #[test]
    fn jump_while_paused_selects_without_playing() {
        let mut clock = clock();
        clock.jump_to(2);
        assert_eq!(clock.poll_active(Instant::now()), Some(2));
        assert!(!clock.is_playing());
    }
}
