//! Multiplier state dumps.
//!
//! The PNM observer writes two kinds of binary P6 images per solve: a
//! `<base>-pi.pnm` sheet with one pixel row per sweep showing the row
//! duals through a diverging colormap, and a `<base>-P-<frame>.pnm`
//! frame per sweep projecting the preferences onto the constraint by
//! variable grid. The file observer dumps the duals as plain text.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use log::warn;

use crate::params::ObserverType;
use crate::sparse::SparseIncidence;

/// Sweep-level hook fed with the duals and preferences.
pub trait Observer: Send {
    /// Record one sweep.
    fn observe(&mut self, pi: &[f64], p: &[f64], ap: &SparseIncidence);

    /// Flush whatever the observer buffered.
    fn finish(&mut self);
}

/// The default do-nothing observer.
#[derive(Debug, Default)]
pub struct NoneObserver;

impl Observer for NoneObserver {
    fn observe(&mut self, _pi: &[f64], _p: &[f64], _ap: &SparseIncidence) {}

    fn finish(&mut self) {}
}

/// Map `v` onto a blue-black-red ramp over `[lo, hi]` centered on zero.
fn diverging_color(v: f64, lo: f64, hi: f64) -> [u8; 3] {
    if v < 0.0 {
        let t = (v / lo).clamp(0.0, 1.0);
        [0, 0, (t * 255.0) as u8]
    } else {
        let t = (v / hi).clamp(0.0, 1.0);
        [(t * 255.0) as u8, 0, 0]
    }
}

fn write_pnm(path: &PathBuf, width: usize, height: usize, pixels: &[u8]) -> io::Result<()> {
    debug_assert_eq!(pixels.len(), width * height * 3);

    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{width} {height}\n255\n")?;
    out.write_all(pixels)?;
    out.flush()
}

/// Observer writing PNM images of pi and P.
#[derive(Debug)]
pub struct PnmObserver {
    basename: String,
    pi_range: f64,
    p_range: f64,
    pi_rows: Vec<u8>,
    sweeps: usize,
    columns: usize,
    frame: usize,
    failed: bool,
}

impl PnmObserver {
    /// Create an observer writing `<basename>-pi.pnm` and
    /// `<basename>-P-<frame>.pnm` files.
    pub fn new(basename: &str, m: usize) -> Self {
        Self {
            basename: basename.to_string(),
            pi_range: 5.0,
            p_range: 10.0,
            pi_rows: Vec::new(),
            sweeps: 0,
            columns: m,
            frame: 0,
            failed: false,
        }
    }

    fn try_observe(&mut self, pi: &[f64], p: &[f64], ap: &SparseIncidence) -> io::Result<()> {
        // One pixel row per sweep for the dual sheet.
        for &v in pi {
            self.pi_rows
                .extend_from_slice(&diverging_color(v, -self.pi_range, self.pi_range));
        }
        self.sweeps += 1;

        // One frame per sweep for the preference grid.
        let (m, n) = (ap.rows(), ap.cols());
        let mut pixels = vec![0u8; m * n * 3];

        for k in 0..m {
            let (cols, vals) = ap.row(k);
            for (&col, &val) in cols.iter().zip(vals) {
                let color = diverging_color(p[val], -self.p_range, self.p_range);
                let at = (k * n + col) * 3;
                pixels[at..at + 3].copy_from_slice(&color);
            }
        }

        let path = PathBuf::from(format!("{}-P-{}.pnm", self.basename, self.frame));
        self.frame += 1;
        write_pnm(&path, n, m, &pixels)
    }

    fn try_finish(&mut self) -> io::Result<()> {
        if self.sweeps == 0 {
            return Ok(());
        }

        let path = PathBuf::from(format!("{}-pi.pnm", self.basename));
        write_pnm(&path, self.columns, self.sweeps, &self.pi_rows)
    }
}

impl Observer for PnmObserver {
    fn observe(&mut self, pi: &[f64], p: &[f64], ap: &SparseIncidence) {
        if self.failed {
            return;
        }
        if let Err(e) = self.try_observe(pi, p, ap) {
            warn!("pnm observer disabled: {e}");
            self.failed = true;
        }
    }

    fn finish(&mut self) {
        if self.failed {
            return;
        }
        if let Err(e) = self.try_finish() {
            warn!("pnm observer: {e}");
        }
    }
}

/// Observer dumping the duals as one text line per sweep.
#[derive(Debug)]
pub struct FileObserver {
    writer: Option<BufWriter<File>>,
    path: String,
}

impl FileObserver {
    /// Create an observer writing `<basename>-pi.txt`.
    pub fn new(basename: &str) -> Self {
        let path = format!("{basename}-pi.txt");
        let writer = match File::create(&path) {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                warn!("file observer disabled: {e}");
                None
            }
        };

        Self { writer, path }
    }
}

impl Observer for FileObserver {
    fn observe(&mut self, pi: &[f64], _p: &[f64], _ap: &SparseIncidence) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let mut line = String::with_capacity(pi.len() * 12);
        for (i, v) in pi.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            let _ = std::fmt::Write::write_fmt(&mut line, format_args!("{v}"));
        }

        if writeln!(writer, "{line}").is_err() {
            warn!("file observer: write to {} failed", self.path);
            self.writer = None;
        }
    }

    fn finish(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

/// Build the observer requested by the parameters.
///
/// Only worker zero observes; other workers always get the no-op
/// observer.
pub fn make_observer(kind: ObserverType, basename: &str, m: usize, worker: usize) -> Box<dyn Observer> {
    if worker != 0 {
        return Box::new(NoneObserver);
    }

    match kind {
        ObserverType::None => Box::new(NoneObserver),
        ObserverType::Pnm => Box::new(PnmObserver::new(basename, m)),
        ObserverType::File => Box::new(FileObserver::new(basename)),
    }
}
