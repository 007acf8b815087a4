use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{debug, info};
use mpclassify::export::{default_export_name, export_results};
use mpclassify::{
    ApiClient, CategorySelector, ClientConfig, ClientError, CorrectionRequest, Marketplace,
    NewUser, Prediction, Role, SelectorError, SelectorState, SessionStore,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the classification API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session file to use instead of the default one
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the session
    Login {
        username: String,
        /// Password; when omitted it is read from stdin, which echoes what is typed
        #[arg(long, env = "MPCLASSIFY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show who is logged in
    Whoami,
    /// Classify one product name
    Predict {
        product_name: String,
        #[arg(short, long, default_value_t = Marketplace::default())]
        marketplace: Marketplace,
        /// Write the result as CSV (default file name when no path is given)
        #[arg(long)]
        export: Option<Option<PathBuf>>,
    },
    /// Classify every product in a CSV file with a `product_name` column
    PredictFile {
        path: PathBuf,
        #[arg(short, long, default_value_t = Marketplace::default())]
        marketplace: Marketplace,
        /// Write the results as CSV (default file name when no path is given)
        #[arg(long)]
        export: Option<Option<PathBuf>>,
    },
    /// Print the category tree of a marketplace
    Tree {
        #[arg(short, long, default_value_t = Marketplace::default())]
        marketplace: Marketplace,
    },
    /// Correct the predicted category of a product
    Correct {
        product_name: String,
        /// Category the classifier predicted
        #[arg(long)]
        predicted: String,
        #[arg(short, long, default_value_t = Marketplace::default())]
        marketplace: Marketplace,
        /// Pick this category path instead of choosing interactively
        #[arg(long)]
        category: Option<String>,
        /// Confidence of the original prediction (0..1)
        #[arg(long, default_value_t = 0.0)]
        confidence: f64,
    },
    /// List submitted corrections
    Feedback {
        #[arg(short, long)]
        marketplace: Option<Marketplace>,
    },
    /// Manage accounts (admin only)
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    /// List all accounts
    List,
    /// Create an account
    Add {
        username: String,
        /// Password; when omitted it is read from stdin, which echoes what is typed
        #[arg(long, env = "MPCLASSIFY_NEW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Delete an account
    Delete {
        id: i64,
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

enum Decision {
    Save,
    Cancel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mpclassify::init_logger();
    let args = Args::parse();

    let mut config = ClientConfig::from_env();
    if let Some(api_url) = args.api_url {
        config = config.with_api_url(api_url);
    }
    if let Some(session) = args.session {
        config = config.with_session_path(session);
    }
    debug!("Using session file {:?}", config.session_path);

    let store = SessionStore::open(&config.session_path)
        .with_context(|| format!("failed to open session file {:?}", config.session_path))?;
    let client = ApiClient::new(config, Arc::new(Mutex::new(store)))?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let result = run(&client, args.command, &mut input).await;
    if let Err(e) = &result {
        let needs_login = match e.downcast_ref::<ClientError>() {
            Some(client_error) => client_error.requires_login(),
            None => matches!(e.downcast_ref::<SelectorError>(), Some(SelectorError::LoginRequired)),
        };
        if needs_login {
            eprintln!("You are not logged in. Run `mpclassify login <username>` first.");
        }
    }
    result
}

async fn run(client: &ApiClient, command: Command, input: &mut Input) -> anyhow::Result<()> {
    match command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password(input).await?,
            };
            let session = client.login(&username, &password).await?;
            println!("Logged in as {} ({})", session.username, session.role);
        }
        Command::Logout => {
            client.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => {
            let user = client.current_user().await?;
            println!("{} (id {}, role {})", user.username, user.id, user.role);
        }
        Command::Predict {
            product_name,
            marketplace,
            export,
        } => {
            let prediction = client.predict(&product_name, marketplace).await?;
            let results = vec![prediction];
            print_predictions(&results);
            maybe_export(export, &results)?;
        }
        Command::PredictFile {
            path,
            marketplace,
            export,
        } => {
            let batch = client
                .predict_file(&path, marketplace)
                .await
                .with_context(|| format!("failed to classify {}", path.display()))?;
            print_predictions(&batch.results);
            println!("\n{} of {} products classified", batch.success, batch.total);
            maybe_export(export, &batch.results)?;
        }
        Command::Tree { marketplace } => {
            let taxonomy = client.category_tree(marketplace).await?;
            let tree = mpclassify::CategoryTree::build(taxonomy.categories);
            print!("{}", tree.render(None));
            let hidden = tree.len() - tree.rows().len();
            println!("\n{} categories for {}", tree.len(), marketplace.display_name());
            if hidden > 0 {
                println!("{} categories are not attached to the tree", hidden);
            }
        }
        Command::Correct {
            product_name,
            predicted,
            marketplace,
            category,
            confidence,
        } => {
            let prediction = Prediction {
                product_name,
                marketplace: Some(marketplace),
                category: predicted,
                category_path: None,
                hierarchy: Vec::new(),
                confidence,
                top_3: Vec::new(),
                error: None,
                corrected: false,
            };
            correct(client, prediction, marketplace, category, input).await?;
        }
        Command::Feedback { marketplace } => {
            let list = client.list_feedback(marketplace).await?;
            for entry in &list.feedback {
                println!(
                    "#{} [{}] {:?}: {} -> {}{}",
                    entry.id,
                    entry.marketplace,
                    entry.product_name,
                    entry.predicted_category,
                    entry.corrected_category,
                    if entry.used_for_training { " (trained)" } else { "" }
                );
            }
            println!("{} corrections", list.total);
        }
        Command::Users { command } => users(client, command, input).await?,
    }
    Ok(())
}

async fn users(client: &ApiClient, command: UsersCommand, input: &mut Input) -> anyhow::Result<()> {
    match command {
        UsersCommand::List => {
            let users = client.list_users().await?;
            println!("{:>6}  {:<24} {:<8} {}", "ID", "USERNAME", "ROLE", "CREATED");
            for user in &users {
                println!(
                    "{:>6}  {:<24} {:<8} {}",
                    user.id,
                    user.username,
                    user.role,
                    user.created_at.as_deref().unwrap_or("-")
                );
            }
        }
        UsersCommand::Add {
            username,
            password,
            role,
        } => {
            let (password, confirmation) = match password {
                Some(password) => (password.clone(), password),
                None => (
                    prompt_password(input).await?,
                    prompt(input, "Repeat password: ").await?,
                ),
            };
            let user = NewUser::new(username, password, Role::from(role))
                .with_confirmation(confirmation);
            let message = client.register(&user).await?;
            println!("{}", message);
        }
        UsersCommand::Delete { id, yes } => {
            if !yes {
                let answer = prompt(input, &format!("Delete user {}? [y/N] ", id)).await?;
                if !answer.eq_ignore_ascii_case("y") {
                    println!("Aborted");
                    return Ok(());
                }
            }
            let message = client.delete_user(id).await?;
            println!("{}", message);
        }
    }
    Ok(())
}

async fn correct(
    client: &ApiClient,
    prediction: Prediction,
    marketplace: Marketplace,
    category: Option<String>,
    input: &mut Input,
) -> anyhow::Result<()> {
    println!("Product:   {}", prediction.product_name);
    println!("Predicted: {}", prediction.category);
    if !client.is_logged_in().await {
        return Err(ClientError::NotLoggedIn.into());
    }
    println!("Loading category tree...");

    let mut selector = CategorySelector::new(marketplace, prediction);
    selector.activate(client).await?;

    let decision = match selector.state() {
        SelectorState::Ready => match category {
            Some(category) => {
                selector.select_category(&category)?;
                Decision::Save
            }
            None => pick_interactively(&mut selector, input).await?,
        },
        SelectorState::LoadFailed => {
            if let Some(message) = selector.load_error() {
                eprintln!("{}", message);
            }
            let text = match category {
                Some(category) => category,
                None => prompt(input, "Correct category: ").await?,
            };
            selector.set_manual_text(text)?;
            if selector.can_save() {
                Decision::Save
            } else {
                Decision::Cancel
            }
        }
        state => bail!("category selector ended up {}", state),
    };

    if let Decision::Cancel = decision {
        selector.cancel(|| println!("Correction cancelled"))?;
        return Ok(());
    }

    let request = selector.save(|prediction, category| {
        CorrectionRequest::from_prediction(prediction, marketplace, category)
    })?;
    let receipt = client.submit_correction(&request).await?;
    info!("Correction submitted: {:?}", receipt.correction_id);
    println!("Category corrected to {}", request.corrected_category);
    match receipt.note {
        Some(note) => println!("{}", note),
        None => println!("{}", receipt.message),
    }
    Ok(())
}

async fn pick_interactively(
    selector: &mut CategorySelector<Prediction>,
    input: &mut Input,
) -> anyhow::Result<Decision> {
    if let Some(tree) = selector.tree() {
        print!("{}", tree.render_numbered(None));
    }

    loop {
        let question = if selector.can_save() {
            "Enter to save, a number to change, q to cancel: "
        } else {
            "Pick a number, q to cancel: "
        };
        let answer = match next_line(input, question).await? {
            Some(answer) => answer,
            None => return Ok(Decision::Cancel),
        };

        match answer.as_str() {
            "q" | "Q" => return Ok(Decision::Cancel),
            "" if selector.can_save() => return Ok(Decision::Save),
            "" => continue,
            number => match number.parse::<usize>() {
                Ok(n) if n >= 1 => match selector.select_row(n - 1) {
                    Ok(()) => println!("Selected: {}", selector.selection().display_path()),
                    Err(e) => eprintln!("{}", e),
                },
                _ => eprintln!("Not a row number: {}", number),
            },
        }
    }
}

fn print_predictions(results: &[Prediction]) {
    for prediction in results {
        println!("\n{}", prediction.product_name);
        if let Some(error) = &prediction.error {
            println!("  failed: {}", error);
            continue;
        }
        println!("  Category:   {}", prediction.category);
        println!("  Path:       {}", prediction.display_path());
        println!("  Confidence: {:.2}%", prediction.confidence_percent());
        for (i, top) in prediction.top_3.iter().enumerate() {
            println!("    {}. {} ({:.0}%)", i + 1, top.category, top.confidence * 100.0);
        }
    }
}

fn maybe_export(export: Option<Option<PathBuf>>, results: &[Prediction]) -> anyhow::Result<()> {
    let Some(path) = export else {
        return Ok(());
    };
    let path = path.unwrap_or_else(|| PathBuf::from(default_export_name()));
    write_export(&path, results)
}

fn write_export(path: &Path, results: &[Prediction]) -> anyhow::Result<()> {
    let count = export_results(path, results)
        .with_context(|| format!("failed to export results to {}", path.display()))?;
    println!("Exported {} results to {}", count, path.display());
    Ok(())
}

async fn prompt(input: &mut Input, question: &str) -> anyhow::Result<String> {
    match next_line(input, question).await? {
        Some(line) => Ok(line),
        None => bail!("no input"),
    }
}

async fn prompt_password(input: &mut Input) -> anyhow::Result<String> {
    eprintln!("Note: the password will be visible as you type it; use --password to avoid that.");
    prompt(input, "Password: ").await
}

async fn next_line(input: &mut Input, question: &str) -> anyhow::Result<Option<String>> {
    print!("{}", question);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}
