use ratatui::{
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Padding, Paragraph},
    Frame,
};

use crate::app::{GateApp, Target, PROMPT};

const PANEL_WIDTH: u16 = 60;
const SUBMIT_WIDTH: u16 = 14;

pub fn draw(f: &mut Frame, app: &mut GateApp, isolated: bool) {
    let area = f.area();
    f.render_widget(Block::default().style(Style::default().bg(Color::Black)), area);

    let item_count = app.items().count() as u16;
    // prompt + blank + items + blank + button(3) + blank + message
    let panel_height = item_count + 10;
    let panel = centered(area, PANEL_WIDTH, panel_height);

    let block = Block::default()
        .title(Line::from(vec![
            Span::styled(" ◆ ", Style::default().fg(Color::Cyan)),
            Span::styled(
                "Task-Based Authentication ",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ]))
        .title_bottom(Line::from(Span::styled(
            if isolated { " locked " } else { " locked (degraded) " },
            Style::default().fg(Color::DarkGray),
        )))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray))
        .padding(Padding::horizontal(2));
    let inner = block.inner(panel);
    f.render_widget(block, panel);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(item_count),
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .split(inner);

    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            PROMPT,
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ))),
        chunks[0],
    );

    let cursor = app.cursor();
    let mut item_areas = Vec::with_capacity(item_count as usize);
    for (i, (name, checked)) in app.items().enumerate() {
        let row = Rect {
            y: chunks[1].y + i as u16,
            height: 1,
            ..chunks[1]
        };
        if row.y >= chunks[1].y + chunks[1].height {
            break;
        }
        let focused = cursor == Target::Item(i);
        let marker = if checked { "[x]" } else { "[ ]" };
        let style = if focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(marker, style),
                Span::raw(" "),
                Span::styled(name.to_string(), style),
            ])),
            row,
        );
        item_areas.push(row);
    }
    app.item_areas = item_areas;

    let [submit_area] = Layout::horizontal([Constraint::Length(SUBMIT_WIDTH)])
        .flex(Flex::Center)
        .areas(chunks[3]);
    let submit_focused = cursor == Target::Submit;
    let submit_block = Block::default()
        .borders(Borders::ALL)
        .border_type(if submit_focused {
            BorderType::Thick
        } else {
            BorderType::Rounded
        })
        .border_style(Style::default().fg(if submit_focused { Color::Green } else { Color::DarkGray }));
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(
            "Submit",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )))
        .centered()
        .block(submit_block),
        submit_area,
    );
    app.submit_area = Some(submit_area);

    let footer = match app.message() {
        Some(message) => Line::from(Span::styled(message.to_string(), Style::default().fg(Color::Red))),
        None => key_hints(),
    };
    f.render_widget(Paragraph::new(footer), chunks[5]);
}

/// Space and Enter both act on the focused row: toggle an item, or submit
/// when the button is focused.
fn key_hints() -> Line<'static> {
    let key = Style::default().fg(Color::DarkGray);
    let label = Style::default().fg(Color::Gray);
    Line::from(vec![
        Span::styled("[↑↓/Tab]", key),
        Span::styled(" Move ", label),
        Span::styled("[Space/Enter]", key),
        Span::styled(" Toggle/Submit ", label),
    ])
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
