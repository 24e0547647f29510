use flame::{self, Span};
use std::fs::File;
use std::io;
use std::mem;
use std::path::Path;

/// Writes the spans recorded on this thread, with repeated spans merged, as an html flame graph.
pub fn write_flame<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let mut spans = match flame::threads().into_iter().next() {
        Some(thread) => thread.spans,
        None => return Ok(()),
    };
    merge_spans(&mut spans);
    flame::dump_html_custom(&mut File::create(path)?, &spans)
}

fn merge_spans(spans: &mut Vec<Span>) {
    if spans.is_empty() {
        return;
    }

    // Sort so spans sharing a name and depth are adjacent, largest first
    spans.sort_unstable_by(|s1, s2| {
        let a = (&s1.name, s1.depth, usize::max_value() - s1.children.len());
        let b = (&s2.name, s2.depth, usize::max_value() - s2.children.len());
        a.cmp(&b)
    });

    // Fold each run into its first span
    let mut merge_targets = vec![0];
    let mut current = 0;
    for i in 1..spans.len() {
        if spans[current].name == spans[i].name && spans[current].depth == spans[i].depth {
            let delta = spans[i].delta;
            let children = mem::replace(&mut spans[i].children, Vec::new());
            spans[current].delta += delta;
            spans[current].children.extend(children);
        } else {
            current = i;
            merge_targets.push(i);
        }
    }

    for (target, &source) in merge_targets.iter().enumerate() {
        spans.swap(target, source);
    }
    spans.truncate(merge_targets.len());

    for span in spans {
        merge_spans(&mut span.children);
    }
}
