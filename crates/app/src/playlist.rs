use spectrum_player_core::{MediaLocator, TrackContext, TrackProvider};

/// Ordered list of locators, optionally wrapping around at either end.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    items: Vec<MediaLocator>,
    repeat: bool,
}

impl Playlist {
    pub fn new(items: Vec<MediaLocator>, repeat: bool) -> Self {
        Self { items, repeat }
    }

    pub fn first(&self) -> Option<&MediaLocator> {
        self.items.first()
    }

    fn position(&self, current: Option<&MediaLocator>) -> Option<usize> {
        let current = current?;
        self.items.iter().position(|item| item == current)
    }
}

impl TrackProvider for Playlist {
    fn next(&mut self, context: &TrackContext<'_>) -> Option<MediaLocator> {
        let next = match self.position(context.current) {
            Some(index) if index + 1 < self.items.len() => index + 1,
            Some(_) if self.repeat => 0,
            Some(_) => return None,
            None => 0,
        };
        self.items.get(next).cloned()
    }

    fn prev(&mut self, context: &TrackContext<'_>) -> Option<MediaLocator> {
        let prev = match self.position(context.current) {
            Some(0) if self.repeat => self.items.len().checked_sub(1)?,
            Some(0) | None => return None,
            Some(index) => index - 1,
        };
        self.items.get(prev).cloned()
    }
}
