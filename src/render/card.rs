use crate::{correlate::CorrelatedRow, frame::Card, smi::DeviceRecord};

use super::{
    RenderOptions,
    bar::Bar,
    line::Line,
    style::{BLUE, BOLD, DIM, GREEN, INVERSE_WHITE_BOLD, PURPLE, RED, UNDERLINED, YELLOW},
};

const SMALL_BAR: usize = 11;
const WIDE_BAR: usize = 36;

const NOT_AVAILABLE: &str = "N/A";

// Render the title, gauges and process table of one device
pub fn card_lines(card: &Card, options: &RenderOptions) -> Vec<Line> {
    let device = &card.device;
    let mut lines = vec![title(device, options.width)];

    if !options.compact {
        lines.push(gauges(device, options.threshold));
        lines.push(power(device, options.threshold));
    }
    lines.push(memory(device, options.threshold));

    lines.extend(process_table(&card.processes, options));

    lines
}

// " GPU 0: GeForce GTX 1080 ......................... P8 "
fn title(device: &DeviceRecord, width: usize) -> Line {
    let right = format!("{} ", device.performance_state);
    let left = format!(" GPU {}: {}", device.device_index, device.name);

    let room = width.saturating_sub(right.chars().count());
    let mut text: String = left.chars().take(room).collect();
    let fill = room - text.chars().count();
    text.push_str(&" ".repeat(fill));
    text.push_str(&right);

    let mut line = Line::new();
    line.push(&[INVERSE_WHITE_BOLD], text);
    line
}

fn gauges(device: &DeviceRecord, threshold: f64) -> Line {
    let bar = Bar::new(SMALL_BAR, threshold);
    let mut line = Line::new();

    gauge(
        &mut line,
        "   Util: ",
        bar,
        device.utilization_ratio(),
        device.gpu_utilization_percent.map(|v| format!("{v}%")),
    );
    gauge(
        &mut line,
        "   Temp: ",
        bar,
        device.temperature_ratio(),
        device.temperature_celsius.map(|v| format!("{v}C")),
    );
    gauge(
        &mut line,
        "    Fan: ",
        bar,
        device.fan_ratio(),
        device.fan_percent.map(|v| format!("{v}%")),
    );

    line
}

fn gauge(
    line: &mut Line,
    label: &str,
    bar: Bar,
    ratio: Option<f64>,
    reading: Option<String>,
) {
    line.push(&[DIM], label);

    match (ratio, reading) {
        (Some(ratio), Some(reading)) => {
            line.extend(bar.draw(ratio));
            line.push(&[], format!("{reading:>5}"));
        }
        _ => {
            line.extend(bar.draw(0.));
            line.push(&[], format!("{NOT_AVAILABLE:>5}"));
        }
    }
}

fn power(device: &DeviceRecord, threshold: f64) -> Line {
    let usage = match (device.power_draw_watts, device.power_cap_watts) {
        (Some(draw), Some(cap)) => Some(format!("{draw} / {cap}W")),
        _ => None,
    };

    usage_bar("  Power: ", device.power_ratio(), usage, threshold)
}

fn memory(device: &DeviceRecord, threshold: f64) -> Line {
    let usage = match (device.memory_used_mib, device.memory_total_mib) {
        (Some(used), Some(total)) => Some(format!("{used} / {total}MiB")),
        _ => None,
    };

    usage_bar("   VRAM: ", device.memory_ratio(), usage, threshold)
}

// Wide bar followed by the percentage and the absolute values
fn usage_bar(
    label: &str,
    ratio: Option<f64>,
    usage: Option<String>,
    threshold: f64,
) -> Line {
    let bar = Bar::new(WIDE_BAR, threshold);
    let mut line = Line::new();
    line.push(&[DIM], label);

    match (ratio, usage) {
        (Some(ratio), Some(usage)) => {
            let percent = format!("{:.0}%", ratio * 100.);
            line.extend(bar.draw(ratio));
            line.push(&[], format!("{percent:>5}    {usage}"));
        }
        _ => {
            line.extend(bar.draw(0.));
            line.push(&[], format!("{NOT_AVAILABLE:>5}"));
        }
    }

    line
}

fn process_table(rows: &[CorrelatedRow], options: &RenderOptions) -> Vec<Line> {
    let mut header = Line::new();
    header
        .push(
            &[UNDERLINED, BOLD],
            row_text("User", "PID", "%CPU", "%RAM", "VRAM (MiB)", "Command"),
        )
        .pad_to(options.width);

    let mut lines = vec![header];

    if rows.is_empty() {
        let mut line = Line::new();
        line.push(&[PURPLE, BOLD], " No processes");
        lines.push(line);
    }

    for row in rows {
        lines.push(process_line(row, options.username.as_deref()));
    }

    lines
}

fn row_text(
    user: &str,
    pid: &str,
    cpu: &str,
    mem: &str,
    gpu_mem: &str,
    command: &str,
) -> String {
    format!(" {user:<9} {pid:>6}   {cpu:>4}   {mem:>4}   {gpu_mem:>10}   {command}")
}

fn process_line(row: &CorrelatedRow, username: Option<&str>) -> Line {
    let gpu_mem = match row.gpu.gpu_memory_mib {
        Some(mib) => mib.to_string(),
        None => NOT_AVAILABLE.to_string(),
    };
    let pid = row.gpu.process_id.to_string();

    let mut line = Line::new();

    let Some(host) = &row.host else {
        // The process exited after nvidia-smi saw it
        let command = format!("{} (exited)", row.gpu.process_name);
        line.push(&[DIM], row_text("-", &pid, "-", "-", &gpu_mem, &command));
        return line;
    };

    let (command, comment) = split_commentary(&host.full_command_line);

    let style: &[&str] = if Some(host.owner_username.as_str()) == username {
        &[BLUE, BOLD]
    } else {
        &[]
    };

    line.push(
        style,
        row_text(
            &host.owner_username,
            &pid,
            &format!("{:.1}", host.cpu_percent),
            &format!("{:.1}", host.mem_percent),
            &gpu_mem,
            command,
        ),
    );

    if !comment.is_empty() {
        line.push(&[], "  ");
    }
    for (color, text) in comment {
        line.push(&[color], text);
    }

    line
}

/// Split a command line from the inline comments marked with `<!..!>`.
///
/// The number of exclamation marks picks the color of each marked
/// segment: one for green, two for yellow and three for red. Text
/// between segments is left unstyled, an unclosed marker runs to the
/// end of the line.
pub fn split_commentary(command: &str) -> (&str, Vec<(&'static str, String)>) {
    let Some(start) = command.find("<!") else {
        return (command, vec![]);
    };

    let mut segments = Vec::new();
    let mut rest = &command[start..];

    while !rest.is_empty() {
        let Some(open) = rest.find("<!") else {
            segments.push(("", rest.to_string()));
            break;
        };
        if open > 0 {
            segments.push(("", rest[..open].to_string()));
        }

        let marked = &rest[open + 1..];
        let level = marked.chars().take_while(|c| *c == '!').count().min(3);
        let body = &marked[level..];
        let color = match level {
            1 => GREEN,
            2 => YELLOW,
            _ => RED,
        };

        let close = format!("{}>", "!".repeat(level));
        match body.find(&close) {
            Some(end) => {
                segments.push((color, body[..end].to_string()));
                rest = &body[end + close.len()..];
            }
            None => {
                segments.push((color, body.to_string()));
                break;
            }
        }
    }

    segments.retain(|(_, text)| !text.is_empty());

    (command[..start].trim_end(), segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{host::HostProcessInfo, render::style::RESET, smi::ProcessGpuRecord};

    fn options(compact: bool) -> RenderOptions {
        RenderOptions {
            width: 80,
            username: Some("alice".to_string()),
            threshold: 0.75,
            compact,
            color: false,
        }
    }

    fn device() -> DeviceRecord {
        DeviceRecord {
            device_index: 0,
            name: "GeForce GTX 1080".to_string(),
            fan_percent: Some(0),
            temperature_celsius: Some(36),
            performance_state: "P8".to_string(),
            power_draw_watts: Some(45),
            power_cap_watts: Some(180),
            memory_used_mib: Some(2048),
            memory_total_mib: Some(8192),
            gpu_utilization_percent: Some(37),
            compute_mode: "Default".to_string(),
            ..Default::default()
        }
    }

    fn unavailable_device() -> DeviceRecord {
        DeviceRecord {
            device_index: 1,
            name: "Tesla K80".to_string(),
            performance_state: "P0".to_string(),
            ..Default::default()
        }
    }

    fn row(pid: u32, user: Option<&str>, command: &str) -> CorrelatedRow {
        CorrelatedRow {
            gpu: ProcessGpuRecord {
                device_index: 0,
                process_id: pid,
                process_type: "C".to_string(),
                process_name: "python".to_string(),
                gpu_memory_mib: Some(1024),
                gpu_instance: None,
                compute_instance: None,
            },
            host: user.map(|user| HostProcessInfo {
                owner_username: user.to_string(),
                process_id: pid,
                cpu_percent: 99.5,
                mem_percent: 2.0,
                virtual_size_kib: 1,
                resident_size_kib: 1,
                terminal: "?".to_string(),
                state: "R".to_string(),
                start_time: "10:00".to_string(),
                elapsed_time: "00:10".to_string(),
                full_command_line: command.to_string(),
            }),
        }
    }

    fn plain(lines: &[Line]) -> Vec<String> {
        lines.iter().map(|line| line.render(80, false)).collect()
    }

    #[test]
    fn title_is_fitted_to_the_width() {
        let line = title(&device(), 40);
        let text = line.plain();

        assert_eq!(text.chars().count(), 40);
        assert!(text.starts_with(" GPU 0: GeForce GTX 1080"));
        assert!(text.ends_with("P8 "));
    }

    #[test]
    fn long_title_keeps_the_state() {
        let mut device = device();
        device.name = "X".repeat(100);

        let text = title(&device, 40).plain();

        assert_eq!(text.chars().count(), 40);
        assert!(text.ends_with("XP8 "));
    }

    #[test]
    fn full_card_layout() {
        let card = Card {
            device: device(),
            processes: vec![],
        };

        let lines = plain(&card_lines(&card, &options(false)));

        assert_eq!(lines.len(), 6);
        assert!(lines[1].contains("Util: ----       "));
        assert!(lines[1].contains("  37%"));
        assert!(lines[1].contains("  36C"));
        assert!(lines[1].contains("   0%"));
        assert!(lines[2].contains("  25%    45 / 180W"));
        assert!(lines[3].contains("  25%    2048 / 8192MiB"));
        assert!(lines[4].contains("VRAM (MiB)"));
        assert_eq!(lines[5], " No processes");
    }

    #[test]
    fn compact_card_keeps_memory() {
        let card = Card {
            device: device(),
            processes: vec![],
        };

        let lines = plain(&card_lines(&card, &options(true)));

        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("   VRAM: "));
    }

    #[test]
    fn unavailable_readings_render_not_available() {
        let card = Card {
            device: unavailable_device(),
            processes: vec![],
        };

        let lines = plain(&card_lines(&card, &options(false)));

        assert_eq!(lines[1].matches(NOT_AVAILABLE).count(), 3);
        assert!(lines[2].ends_with(NOT_AVAILABLE));
        assert!(lines[3].ends_with(NOT_AVAILABLE));
        assert!(!lines[3].contains('%'));
    }

    #[test]
    fn zero_cap_is_not_divided_by() {
        let mut device = device();
        device.power_cap_watts = Some(0);

        let text = power(&device, 0.75).plain();
        assert!(text.ends_with(NOT_AVAILABLE));
    }

    #[test]
    fn own_processes_are_highlighted() {
        let mine = process_line(&row(1, Some("alice"), "python a.py"), Some("alice"));
        let theirs = process_line(&row(2, Some("bob"), "python b.py"), Some("alice"));

        assert!(mine.render(80, true).contains(BLUE));
        assert!(!theirs.render(80, true).contains(BLUE));
        assert_eq!(
            theirs.plain(),
            " bob            2   99.5    2.0         1024   python b.py"
        );
    }

    #[test]
    fn exited_processes_are_degraded() {
        let line = process_line(&row(3, None, ""), Some("alice"));

        assert_eq!(
            line.plain(),
            " -              3      -      -         1024   python (exited)"
        );
    }

    #[test]
    fn commentary_is_colored() {
        assert_eq!(split_commentary("python a.py"), ("python a.py", vec![]));

        let (command, comment) = split_commentary("python a.py <!!running!!>");
        assert_eq!(command, "python a.py");
        assert_eq!(comment, vec![(YELLOW, "running".to_string())]);

        let (_, comment) = split_commentary("job <!!!diverged!!!>");
        assert_eq!(comment, vec![(RED, "diverged".to_string())]);

        let (_, comment) = split_commentary("job <!epoch 3!>");
        assert_eq!(comment, vec![(GREEN, "epoch 3".to_string())]);
    }

    #[test]
    fn each_comment_keeps_its_color() {
        let (command, comment) = split_commentary("job <!a!> <!!!b!!!>");

        assert_eq!(command, "job");
        assert_eq!(
            comment,
            vec![
                (GREEN, "a".to_string()),
                ("", " ".to_string()),
                (RED, "b".to_string()),
            ]
        );

        let line = process_line(&row(5, Some("bob"), "job <!a!> <!!!b!!!>"), None);
        let rendered = line.render(80, true);

        assert!(line.plain().ends_with("job  a b"));
        assert!(rendered.contains(&format!("{GREEN}a{RESET}")));
        assert!(rendered.contains(&format!("{RED}b{RESET}")));
    }

    #[test]
    fn unclosed_comment_runs_to_the_end() {
        let (_, comment) = split_commentary("job <!!still going");
        assert_eq!(comment, vec![(YELLOW, "still going".to_string())]);
    }

    #[test]
    fn commentary_follows_the_command() {
        let line = process_line(&row(4, Some("bob"), "train <!ok!>"), None);

        assert!(line.plain().ends_with("train  ok"));
    }
}
