use crate::buttons::{ActionPad, Control};
use crate::mobile::MobileControls;
use crate::network::UplinkStatus;
use crate::touch::TouchSurfaceController;
use macroquad::prelude::*;
use shared::{Action, InputState, InventoryDirection};

const KNOB_RADIUS: f32 = 24.0;

/// Debug overlay: control surfaces, current input and session state
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Renderer
    }

    pub fn render(&mut self, controls: &MobileControls, input: &InputState, status: &UplinkStatus) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_joystick(controls.joystick());
        self.draw_pad(controls.pad(), input);
        self.draw_ui(input, status);
    }

    fn draw_joystick(&mut self, joystick: &TouchSurfaceController) {
        let Some(surface) = joystick.surface() else {
            return;
        };
        let center = surface.center();

        draw_circle(center.x, center.y, surface.radius(), Color::from_rgba(0, 0, 0, 77));
        draw_circle_lines(
            center.x,
            center.y,
            surface.radius(),
            1.0,
            Color::from_rgba(255, 255, 255, 51),
        );

        let knob = joystick.knob_position().unwrap_or(center);
        draw_circle(knob.x, knob.y, KNOB_RADIUS, Color::from_rgba(255, 255, 255, 128));
    }

    fn draw_pad(&mut self, pad: &ActionPad, input: &InputState) {
        for region in pad.regions() {
            let (color, label) = match region.control {
                Control::Hold(action) => {
                    let alpha = if input.buttons.is_pressed(action) { 204 } else { 128 };
                    (Self::action_color(action, alpha), action.name())
                }
                Control::Cycle(InventoryDirection::Previous) => {
                    (Color::from_rgba(107, 114, 128, 128), "<")
                }
                Control::Cycle(InventoryDirection::Next) => {
                    (Color::from_rgba(107, 114, 128, 128), ">")
                }
            };

            draw_circle(region.center.x, region.center.y, region.radius, color);

            let size = measure_text(label, None, 14, 1.0);
            draw_text(
                label,
                region.center.x - size.width / 2.0,
                region.center.y + size.height / 2.0,
                14.0,
                WHITE,
            );
        }
    }

    fn action_color(action: Action, alpha: u8) -> Color {
        match action {
            Action::Fire => Color::from_rgba(220, 38, 38, alpha),
            Action::Interact => Color::from_rgba(234, 179, 8, alpha),
            Action::Sprint => Color::from_rgba(59, 130, 246, alpha),
            Action::Drop => Color::from_rgba(239, 68, 68, alpha),
        }
    }

    fn draw_ui(&mut self, input: &InputState, status: &UplinkStatus) {
        let connection_color = if status.connection_id.is_some() {
            GREEN
        } else {
            RED
        };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);

        let connection_text = match (&status.connection_id, &status.disconnect_reason) {
            (Some(id), _) => format!("CON {}", id),
            (None, Some(reason)) => format!("OFF {}", reason),
            (None, None) => "connecting".to_string(),
        };
        draw_text(&connection_text, 24.0, 18.0, 14.0, WHITE);

        let ack = status
            .last_processed_input
            .map_or("-".to_string(), |seq| seq.to_string());
        let lines = [
            format!("tick {}  peers {}", status.tick, status.peers),
            format!("seq {}  ack {}", input.sequence, ack),
            format!("move {:+.2} {:+.2}", input.move_x, input.move_y),
        ];
        for (i, line) in lines.iter().enumerate() {
            draw_text(line, 10.0, 36.0 + i as f32 * 16.0, 14.0, WHITE);
        }

        let mut x = 10.0;
        for action in input.buttons.pressed() {
            let size = measure_text(action.name(), None, 14, 1.0);
            draw_text(action.name(), x, 36.0 + 3.0 * 16.0, 14.0, YELLOW);
            x += size.width + 8.0;
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
