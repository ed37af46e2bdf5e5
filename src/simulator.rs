//! Synthetic analytics traffic for exercising a client end to end.
//!
//! Generates a weighted mix of message types from a small pool of simulated
//! users: mostly `track` and `page`, with occasional `identify`, `group`,
//! `screen` and `alias` calls.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::client::Client;
use crate::error::Result;
use crate::message::{Alias, Group, Identify, Page, Screen, Track};

/// Message kinds that can be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Track,
    Page,
    Screen,
    Identify,
    Group,
    Alias,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::Track,
            EventKind::Page,
            EventKind::Screen,
            EventKind::Identify,
            EventKind::Group,
            EventKind::Alias,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Track => "track",
            EventKind::Page => "page",
            EventKind::Screen => "screen",
            EventKind::Identify => "identify",
            EventKind::Group => "group",
            EventKind::Alias => "alias",
        }
    }
}

// Track: 55%, Page: 20%, Screen: 10%, Identify: 8%, Group: 5%, Alias: 2%
const KIND_WEIGHTS: &[(EventKind, u32)] = &[
    (EventKind::Track, 55),
    (EventKind::Page, 20),
    (EventKind::Screen, 10),
    (EventKind::Identify, 8),
    (EventKind::Group, 5),
    (EventKind::Alias, 2),
];

const TRACK_EVENTS: &[&str] = &[
    "Product Viewed",
    "Product Added",
    "Cart Viewed",
    "Checkout Started",
    "Order Completed",
    "Search Performed",
];

const PAGES: &[(&str, &str)] = &[
    ("Home", "landing"),
    ("Pricing", "marketing"),
    ("Docs", "support"),
    ("Product", "catalog"),
    ("Checkout", "commerce"),
];

const SCREENS: &[&str] = &["Feed", "Profile", "Settings", "Inbox"];

const PLANS: &[&str] = &["free", "pro", "enterprise"];

/// Configuration for the event generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of distinct simulated users
    pub users: usize,

    /// Number of distinct simulated groups
    pub groups: usize,

    /// Probability that a message carries only an anonymous id
    pub anonymous_rate: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            users: 50,
            groups: 5,
            anonymous_rate: 0.2,
        }
    }
}

/// One generated message, ready to enqueue.
#[derive(Debug, Clone)]
pub enum GeneratedMessage {
    Track(Track),
    Page(Page),
    Screen(Screen),
    Identify(Identify),
    Group(Group),
    Alias(Alias),
}

impl GeneratedMessage {
    pub fn kind(&self) -> EventKind {
        match self {
            GeneratedMessage::Track(_) => EventKind::Track,
            GeneratedMessage::Page(_) => EventKind::Page,
            GeneratedMessage::Screen(_) => EventKind::Screen,
            GeneratedMessage::Identify(_) => EventKind::Identify,
            GeneratedMessage::Group(_) => EventKind::Group,
            GeneratedMessage::Alias(_) => EventKind::Alias,
        }
    }

    /// Enqueue on `client` through the matching facade call.
    pub fn send(self, client: &Client) -> Result<String> {
        match self {
            GeneratedMessage::Track(m) => client.track(m),
            GeneratedMessage::Page(m) => client.page(m),
            GeneratedMessage::Screen(m) => client.screen(m),
            GeneratedMessage::Identify(m) => client.identify(m),
            GeneratedMessage::Group(m) => client.group(m),
            GeneratedMessage::Alias(m) => client.alias(m),
        }
    }
}

/// Random analytics traffic generator.
pub struct EventGenerator {
    config: GeneratorConfig,
}

impl EventGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config: GeneratorConfig {
                users: config.users.max(1),
                groups: config.groups.max(1),
                anonymous_rate: config.anonymous_rate.clamp(0.0, 1.0),
            },
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(GeneratorConfig::default())
    }

    /// Generate a single random message.
    pub fn generate(&self) -> GeneratedMessage {
        let mut rng = rand::thread_rng();
        let kind = KIND_WEIGHTS
            .choose_weighted(&mut rng, |(_, weight)| *weight)
            .map(|(kind, _)| *kind)
            .unwrap_or(EventKind::Track);
        let user = rng.gen_range(1..=self.config.users);
        let user_id = format!("user-{user:04}");
        let anonymous_id = format!("anon-{user:04}");
        let anonymous = rng.gen_bool(self.config.anonymous_rate);

        match kind {
            EventKind::Track => {
                let event = TRACK_EVENTS.choose(&mut rng).copied().unwrap_or("Product Viewed");
                let mut track = Track::new(event)
                    .property("sku", format!("SKU-{:05}", rng.gen_range(0..100_000)))
                    .property("price", (rng.gen_range(100..50_000u32) as f64) / 100.0)
                    .property("quantity", rng.gen_range(1..=5));
                track = if anonymous {
                    track.anonymous_id(anonymous_id)
                } else {
                    track.user_id(user_id)
                };
                GeneratedMessage::Track(track)
            }
            EventKind::Page => {
                let (name, category) = PAGES.choose(&mut rng).copied().unwrap_or(("Home", "landing"));
                let page = Page::new(name)
                    .category(category)
                    .property("path", format!("/{}", name.to_lowercase()))
                    .anonymous_id(anonymous_id);
                GeneratedMessage::Page(if anonymous { page } else { page.user_id(user_id) })
            }
            EventKind::Screen => {
                let name = SCREENS.choose(&mut rng).copied().unwrap_or("Feed");
                let screen = Screen::new(name).anonymous_id(anonymous_id);
                GeneratedMessage::Screen(if anonymous { screen } else { screen.user_id(user_id) })
            }
            EventKind::Identify => {
                let plan = PLANS.choose(&mut rng).copied().unwrap_or("free");
                GeneratedMessage::Identify(
                    Identify::new()
                        .user_id(user_id.clone())
                        .traits("email", format!("{user_id}@example.com"))
                        .traits("plan", plan),
                )
            }
            EventKind::Group => {
                let group = rng.gen_range(1..=self.config.groups);
                GeneratedMessage::Group(
                    Group::new(format!("org-{group:03}"))
                        .user_id(user_id)
                        .traits("employees", rng.gen_range(1..=5_000)),
                )
            }
            EventKind::Alias => GeneratedMessage::Alias(Alias::new(anonymous_id, user_id)),
        }
    }

    pub fn generate_batch(&self, count: usize) -> Vec<GeneratedMessage> {
        (0..count).map(|_| self.generate()).collect()
    }
}

impl Default for EventGenerator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn validate(message: &GeneratedMessage) -> bool {
        match message {
            GeneratedMessage::Track(m) => m.validate().is_ok(),
            GeneratedMessage::Page(m) => m.validate().is_ok(),
            GeneratedMessage::Screen(m) => m.validate().is_ok(),
            GeneratedMessage::Identify(m) => m.validate().is_ok(),
            GeneratedMessage::Group(m) => m.validate().is_ok(),
            GeneratedMessage::Alias(m) => m.validate().is_ok(),
        }
    }

    #[test]
    fn test_generated_messages_are_valid() {
        let generator = EventGenerator::with_defaults();
        for message in generator.generate_batch(500) {
            assert!(validate(&message), "invalid {:?}", message.kind());
        }
    }

    #[test]
    fn test_generate_batch_size() {
        let generator = EventGenerator::with_defaults();
        assert_eq!(generator.generate_batch(50).len(), 50);
    }

    #[test]
    fn test_track_dominates_mix() {
        let generator = EventGenerator::with_defaults();
        let batch = generator.generate_batch(2000);
        let tracks = batch.iter().filter(|m| m.kind() == EventKind::Track).count();

        // 55% expected
        assert!(tracks > 800, "only {tracks} track events");
        assert!(tracks < 1400, "{tracks} track events");
    }

    #[test]
    fn test_user_ids_within_pool() {
        let generator = EventGenerator::new(GeneratorConfig {
            users: 3,
            groups: 1,
            anonymous_rate: 0.0,
        });

        for message in generator.generate_batch(200) {
            if let GeneratedMessage::Identify(m) = message {
                let id = m.common.user_id.unwrap_or_default();
                assert!(["user-0001", "user-0002", "user-0003"].contains(&id.as_str()));
            }
        }
    }

    #[test]
    fn test_kind_names() {
        let names: Vec<&str> = EventKind::all().iter().map(EventKind::name).collect();
        assert_eq!(names, ["track", "page", "screen", "identify", "group", "alias"]);
    }
}
