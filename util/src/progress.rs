use std::borrow::Cow;
use std::iter::ExactSizeIterator;
use std::io::Stderr;
use std::time::Duration;

use pbr::ProgressBar;

/// Wraps an iterator, drawing a progress bar on stderr when enabled.
pub struct ReportingIterator<I>
  where I: ExactSizeIterator,
{
  name: Cow<'static, str>,
  progress: Option<ProgressBar<Stderr>>,
  inner: I,
}
impl<I> ReportingIterator<I>
  where I: ExactSizeIterator,
{
  pub fn new(inner: I, name: Cow<'static, str>, enabled: bool) -> ReportingIterator<I> {
    let progress = if enabled {
      let mut p = ProgressBar::on(::std::io::stderr(), inner.len() as _);
      p.show_speed = false;
      p.show_percent = true;
      p.show_counter = true;
      p.show_time_left = true;

      let fps = Duration::new(1, 0) / 60;
      p.set_max_refresh_rate(Some(fps));

      let msg = format!("{}: ", name);
      p.message(&msg[..]);
      Some(p)
    } else {
      None
    };

    ReportingIterator {
      name: name,
      progress: progress,
      inner: inner,
    }
  }
}

impl<I> Iterator for ReportingIterator<I>
  where I: ExactSizeIterator,
{
  type Item = I::Item;
  fn next(&mut self) -> Option<Self::Item> {
    match self.inner.next() {
      Some(v) => {
        if let Some(ref mut p) = self.progress {
          p.inc();
        }
        Some(v)
      },
      None => {
        if let Some(ref mut p) = self.progress {
          let msg = format!("{} done!", self.name);
          p.finish_println(&msg);
        }
        self.progress = None;
        None
      },
    }
  }
}
