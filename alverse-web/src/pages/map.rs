use std::rc::Rc;

use alverse_core::{AlverseConfig, LevelMapModel, LevelNode, LevelStatus, MapPosition};
use yew::prelude::*;

#[derive(Properties, Clone, PartialEq)]
pub struct MapPageProps {
    pub model: Rc<LevelMapModel>,
    pub config: Rc<AlverseConfig>,
    pub username: AttrValue,
    #[prop_or_default]
    pub email: AttrValue,
    #[prop_or_default]
    pub error: Option<AttrValue>,
    #[prop_or_default]
    pub resetting: bool,
    /// Receives the page URL of a clicked, playable level.
    pub on_open: Callback<String>,
    pub on_next: Callback<()>,
    pub on_reset: Callback<()>,
    pub on_logout: Callback<()>,
}

const fn status_class(status: LevelStatus) -> &'static str {
    match status {
        LevelStatus::Completed => "level-node completed",
        LevelStatus::Current => "level-node current",
        LevelStatus::Unlocked => "level-node unlocked",
        LevelStatus::Locked => "level-node locked",
    }
}

fn position_style(position: MapPosition) -> String {
    format!("left: {:.2}%; top: {:.2}%;", position.x, position.y)
}

fn star_row(stars: u8) -> String {
    "★".repeat(usize::from(stars.min(3)))
}

fn node_icon(icon: &str) -> Html {
    if icon.starts_with("./") || icon.starts_with('/') {
        html! { <img class="level-icon" src={icon.to_string()} alt="" /> }
    } else {
        html! { <span class="level-icon" aria-hidden="true">{ icon.to_string() }</span> }
    }
}

fn level_node(node: &LevelNode, target: Option<String>, on_open: &Callback<String>) -> Html {
    let label = format!("Level {}: {}", node.number, node.topic);
    let onclick = {
        let on_open = on_open.clone();
        let target = target.clone();
        Callback::from(move |_| {
            if let Some(url) = target.clone() {
                on_open.emit(url);
            }
        })
    };

    html! {
        <button
            key={node.number.to_string()}
            class={status_class(node.status)}
            style={position_style(node.position)}
            data-level={node.number.to_string()}
            title={node.description.clone()}
            aria-label={label}
            disabled={target.is_none()}
            {onclick}
        >
            { node_icon(&node.icon) }
            <span class="level-number">{ node.number.to_string() }</span>
            <span class="level-topic">{ node.topic.clone() }</span>
            <span class="level-stars">{ star_row(node.stars) }</span>
            if let Some(score) = node.high_score {
                <span class="level-score">{ format!("Best: {score}") }</span>
            }
        </button>
    }
}

#[function_component(MapPage)]
pub fn map_page(props: &MapPageProps) -> Html {
    let model = &props.model;
    let total = model.nodes.len();
    let completed = model
        .nodes
        .iter()
        .filter(|node| node.status == LevelStatus::Completed)
        .count();
    let current = usize::try_from(model.current_level)
        .unwrap_or(usize::MAX)
        .min(total);

    let on_next = {
        let cb = props.on_next.clone();
        Callback::from(move |_| cb.emit(()))
    };
    let on_reset = {
        let cb = props.on_reset.clone();
        Callback::from(move |_| cb.emit(()))
    };
    let on_logout = {
        let cb = props.on_logout.clone();
        Callback::from(move |_| cb.emit(()))
    };

    html! {
        <section class="level-map" aria-labelledby="map-title" data-testid="level-map">
            if let Some(error) = props.error.clone() {
                <div class="map-error" role="alert">{ error }</div>
            }
            if model.loading {
                <div class="map-syncing" role="status">{ "Syncing your progress. Please wait..." }</div>
            }
            <header class="map-header">
                <div class="user-info">
                    <span class="username">{ props.username.clone() }</span>
                    if !props.email.is_empty() {
                        <span class="email">{ props.email.clone() }</span>
                    }
                </div>
                <h1 id="map-title">{ "Level Map" }</h1>
                <button class="logout" aria-label="Logout" onclick={on_logout}>{ "Logout" }</button>
            </header>
            <div
                class="map-progress"
                role="progressbar"
                aria-valuemin="0"
                aria-valuemax={total.to_string()}
                aria-valuenow={completed.to_string()}
            >
                { format!("Level {current} of {total} · {completed} completed") }
            </div>
            <div class="map-canvas" data-testid="map-canvas">
                <div
                    class="map-path"
                    data-progress={format!("{:.3}", model.path_progress)}
                    style={format!("--path-progress: {:.3};", model.path_progress)}
                ></div>
                if let Some(position) = model.marker_position() {
                    <div class="map-marker" style={position_style(position)}></div>
                }
                { for model.nodes.iter().map(|node| {
                    level_node(node, model.click_target(node.number, &props.config), &props.on_open)
                }) }
            </div>
            <div class="map-controls">
                if model.all_completed {
                    <div class="map-finished" role="status">
                        <p class="title">{ "Congratulations!" }</p>
                        <p>{ "You've completed all levels!" }</p>
                    </div>
                } else {
                    <button class="next" disabled={!model.next_enabled} onclick={on_next}>
                        { "Next Level" }
                    </button>
                }
                <button
                    class="reset"
                    disabled={!model.reset_enabled || model.loading}
                    onclick={on_reset}
                >
                    { if props.resetting { "Resetting..." } else { "Reset Progress" } }
                </button>
            </div>
        </section>
    }
}
